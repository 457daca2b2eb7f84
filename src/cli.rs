//! 命令行参数

use crate::core::{HwAccelChoice, PipelineError, PlayerConfig, Preset, Result};
use clap::Parser;
use std::path::PathBuf;

/// 解析后的命令行参数，覆盖配置文件中的同名字段
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "stream-view", version, about = "解码并显示 HLS / 网络视频流")]
pub struct Args {
    /// 媒体地址（m3u8、直链或本地文件）
    pub url: Option<String>,

    /// 显示方式预设
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// 按时间戳控速
    #[arg(long, overrides_with = "no_pace")]
    pub pace: bool,

    /// 不控速，尽快解码
    #[arg(long, overrides_with = "pace")]
    pub no_pace: bool,

    /// 硬件加速类型（仅 hw-queue 预设生效）
    #[arg(long, value_enum)]
    pub hwaccel: Option<HwAccelChoice>,

    /// 显示队列容量（帧）
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// 不打开窗口
    #[arg(long)]
    pub headless: bool,

    /// 显示这么多帧后停止
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// 无窗口模式下保存截图的目录
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// 每隔多少帧保存一张截图
    #[arg(long)]
    pub snapshot_every: Option<u64>,

    /// 结束时把统计写入该 JSON 文件
    #[arg(long)]
    pub stats_json: Option<PathBuf>,

    /// JSON 配置文件
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// --pace / --no-pace，都没给时为 None
    pub fn pace_override(&self) -> Option<bool> {
        match (self.pace, self.no_pace) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    /// 合并配置文件与命令行，返回校验过的配置
    pub fn into_config(self) -> Result<PlayerConfig> {
        let base = match &self.config {
            Some(path) => PlayerConfig::load(path).map_err(|e| {
                PipelineError::Config(format!("读取配置文件 {} 失败: {}", path.display(), e))
            })?,
            None => PlayerConfig::default(),
        };
        let config = self.apply(base);
        config.validate()?;
        Ok(config)
    }

    fn apply(self, mut config: PlayerConfig) -> PlayerConfig {
        if let Some(pace) = self.pace_override() {
            config.pace = Some(pace);
        }
        if let Some(url) = self.url {
            config.url = url;
        }
        if let Some(preset) = self.preset {
            config.preset = preset;
        }
        if let Some(hwaccel) = self.hwaccel {
            config.hwaccel = hwaccel;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(every) = self.snapshot_every {
            config.snapshot_every = every;
        }
        config.headless |= self.headless;
        config.max_frames = self.max_frames.or(config.max_frames);
        config.snapshot_dir = self.snapshot_dir.or(config.snapshot_dir);
        config.stats_json = self.stats_json.or(config.stats_json);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("stream-view").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["https://example.com/live.m3u8"]).into_config().unwrap();
        assert_eq!(config.url, "https://example.com/live.m3u8");
        assert_eq!(config.preset, Preset::Bitmap);
        assert!(!config.pacing_enabled());
        assert!(!config.headless);
    }

    #[test]
    fn test_preset_and_flags() {
        let config = parse(&[
            "a.m3u8",
            "--preset",
            "hw-queue",
            "--hwaccel",
            "videotoolbox",
            "--queue-capacity",
            "3",
            "--headless",
            "--max-frames",
            "10",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.preset, Preset::HwQueue);
        assert_eq!(config.hwaccel, HwAccelChoice::VideoToolbox);
        assert_eq!(config.queue_capacity, 3);
        assert!(config.headless);
        assert_eq!(config.max_frames, Some(10));
        assert!(config.pacing_enabled());
    }

    #[test]
    fn test_pace_flags() {
        assert_eq!(parse(&["a"]).pace_override(), None);
        assert_eq!(parse(&["a", "--pace"]).pace_override(), Some(true));
        assert_eq!(parse(&["a", "--no-pace"]).pace_override(), Some(false));
        // 后出现的覆盖先出现的
        assert_eq!(parse(&["a", "--pace", "--no-pace"]).pace_override(), Some(false));

        let config = parse(&["a", "--preset", "hw-queue", "--no-pace"]).into_config().unwrap();
        assert!(!config.pacing_enabled());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let base = PlayerConfig::from_json(
            r#"{ "url": "file.m3u8", "preset": "sample-queue", "queue_capacity": 16, "max_frames": 5 }"#,
        )
        .unwrap();

        let config = parse(&["--queue-capacity", "2"]).apply(base);
        assert_eq!(config.url, "file.m3u8");
        assert_eq!(config.preset, Preset::SampleQueue);
        assert_eq!(config.queue_capacity, 2);
        assert_eq!(config.max_frames, Some(5));
    }

    #[test]
    fn test_missing_url_is_rejected() {
        let err = parse(&[]).into_config().unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_unknown_preset_is_rejected() {
        assert!(Args::try_parse_from(["stream-view", "a", "--preset", "opengl"]).is_err());
    }
}
