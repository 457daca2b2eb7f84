use crate::core::{PipelineError, PixelLayout, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 播放预设：决定显示端、解码方式以及是否按节拍显示
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// 软解 → RGBA → 位图显示，不控速
    #[default]
    Bitmap,
    /// 软解 → NV12 → 显示队列，不控速
    SampleQueue,
    /// 硬解（失败回退软解）→ NV12 → 显示队列，按时间戳控速
    HwQueue,
}

/// 显示端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Bitmap,
    Queue,
}

impl SinkKind {
    pub fn layout(&self) -> PixelLayout {
        match self {
            SinkKind::Bitmap => PixelLayout::Rgba,
            SinkKind::Queue => PixelLayout::Nv12,
        }
    }
}

impl Preset {
    pub fn sink_kind(&self) -> SinkKind {
        match self {
            Preset::Bitmap => SinkKind::Bitmap,
            Preset::SampleQueue | Preset::HwQueue => SinkKind::Queue,
        }
    }

    pub fn paced_by_default(&self) -> bool {
        matches!(self, Preset::HwQueue)
    }

    pub fn wants_hardware(&self) -> bool {
        matches!(self, Preset::HwQueue)
    }
}

/// 硬件加速选择
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccelChoice {
    /// 按平台自动选择
    #[default]
    Auto,
    /// 强制软解
    None,
    #[value(name = "videotoolbox")]
    VideoToolbox,
    Vaapi,
    Cuda,
}

/// 播放配置
///
/// 可以从 JSON 文件加载，命令行参数覆盖文件中的值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub url: String,
    pub preset: Preset,
    /// None 表示跟随预设
    pub pace: Option<bool>,
    pub hwaccel: HwAccelChoice,
    /// 显示队列容量（帧）
    pub queue_capacity: usize,
    pub headless: bool,
    pub max_frames: Option<u64>,
    pub snapshot_dir: Option<PathBuf>,
    pub snapshot_every: u64,
    pub stats_json: Option<PathBuf>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            preset: Preset::default(),
            pace: None,
            hwaccel: HwAccelChoice::default(),
            queue_capacity: 8,
            headless: false,
            max_frames: None,
            snapshot_dir: None,
            snapshot_every: 30,
            stats_json: None,
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn pacing_enabled(&self) -> bool {
        self.pace.unwrap_or_else(|| self.preset.paced_by_default())
    }

    /// 实际使用的硬件加速（预设不需要硬解时为 None）
    pub fn effective_hwaccel(&self) -> HwAccelChoice {
        if self.preset.wants_hardware() {
            self.hwaccel
        } else {
            HwAccelChoice::None
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(PipelineError::Config("未指定媒体地址".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::Config("显示队列容量必须大于 0".to_string()));
        }
        if self.snapshot_every == 0 {
            return Err(PipelineError::Config("截图间隔必须大于 0".to_string()));
        }
        Ok(())
    }
}
