use crate::core::{MediaTime, PipelineState, PipelineStats, PlayerConfig, Preset};
use crate::player::{FrameOutput, PipelineFactory};
use crate::renderer::DisplayImageConverter;
use anyhow::{Context as _, Result};
use image::RgbaImage;
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// 无窗口运行结束后的汇总
#[derive(Debug, Clone, Serialize)]
pub struct HeadlessSummary {
    pub url: String,
    pub preset: Preset,
    pub state: PipelineState,
    /// 显示端交出的帧数
    pub frames_received: u64,
    pub snapshots_written: u64,
    pub elapsed_secs: f64,
    pub stats: PipelineStats,
}

/// 每隔 N 帧保存一张 PNG
pub struct SnapshotWriter {
    dir: PathBuf,
    every: u64,
    seen: u64,
    written: u64,
}

impl SnapshotWriter {
    pub fn new(dir: &Path, every: u64) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("无法创建截图目录 {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            every: every.max(1),
            seen: 0,
            written: 0,
        })
    }

    /// 第 1、1+N、1+2N... 帧落盘，返回写出的路径
    pub fn offer(&mut self, image: &RgbaImage, pts: MediaTime) -> Result<Option<PathBuf>> {
        let index = self.seen;
        self.seen += 1;
        if index % self.every != 0 {
            return Ok(None);
        }

        let path = self.dir.join(format!("frame_{:06}_pts{}.png", index, pts.0));
        image
            .save(&path)
            .with_context(|| format!("保存截图 {} 失败", path.display()))?;
        self.written += 1;
        Ok(Some(path))
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

/// 无窗口运行：取帧、按需截图、到达帧数上限或流结束后停止
pub fn run(config: &PlayerConfig) -> Result<HeadlessSummary> {
    let started = Instant::now();
    let (mut handle, mut output) = PipelineFactory::spawn(config);

    let mut snapshots = config
        .snapshot_dir
        .as_deref()
        .map(|dir| SnapshotWriter::new(dir, config.snapshot_every))
        .transpose()?;
    let mut converter = DisplayImageConverter::new();
    let mut frames_received = 0u64;

    let limit_reached = |received: u64| config.max_frames.is_some_and(|max| received >= max);

    while !limit_reached(frames_received) {
        // 先看线程是否已结束，再取帧，避免漏掉最后几帧
        let finished = handle.is_finished();
        let frame = match &mut output {
            FrameOutput::Bitmap(receiver) => receiver
                .recv_timeout(Duration::from_millis(50))
                .map(|bitmap| (bitmap.image, bitmap.pts)),
            FrameOutput::Queue(display) => match display.take_due(Instant::now()) {
                Some(sample) => match converter.to_image(&sample.buffer) {
                    Ok(image) => Some((image, sample.pts)),
                    Err(e) => {
                        warn!("显示转换失败: {}", e);
                        None
                    }
                },
                None => {
                    thread::sleep(Duration::from_millis(5));
                    None
                }
            },
        };

        let Some((image, pts)) = frame else {
            let pending = match &output {
                FrameOutput::Bitmap(_) => 0,
                FrameOutput::Queue(display) => display.queued(),
            };
            if finished && pending == 0 {
                break;
            }
            continue;
        };
        frames_received += 1;
        if let Some(writer) = snapshots.as_mut() {
            if let Some(path) = writer.offer(&image, pts)? {
                info!("📸 截图: {}", path.display());
            }
        }
    }

    if limit_reached(frames_received) {
        info!("🏁 已达到帧数上限 {}", frames_received);
    }

    let stats = match handle.stop() {
        Some(result) => result.with_context(|| format!("管线运行失败: {}", config.url))?,
        None => handle.stats(),
    };

    Ok(HeadlessSummary {
        url: config.url.clone(),
        preset: config.preset,
        state: handle.state(),
        frames_received,
        snapshots_written: snapshots.as_ref().map_or(0, SnapshotWriter::written),
        elapsed_secs: started.elapsed().as_secs_f64(),
        stats,
    })
}

/// 输出汇总：指定了文件就写文件，否则打印到标准输出
pub fn write_summary(summary: &HeadlessSummary, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("序列化统计失败")?;
    match path {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("写入 {} 失败", path.display()))?;
            info!("📊 统计已写入 {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stream_view_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_snapshot_writer_interval() {
        let dir = scratch_dir("snapshots");
        let mut writer = SnapshotWriter::new(&dir, 2).unwrap();
        let image = RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]));

        let written: Vec<bool> = (0..5)
            .map(|i| writer.offer(&image, MediaTime(i)).unwrap().is_some())
            .collect();

        assert_eq!(written, vec![true, false, true, false, true]);
        assert_eq!(writer.written(), 3);

        let saved = image::open(dir.join("frame_000002_pts2.png")).unwrap().to_rgba8();
        assert_eq!(saved, image);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_summary_json() {
        let summary = HeadlessSummary {
            url: "a.m3u8".into(),
            preset: Preset::SampleQueue,
            state: PipelineState::Finished,
            frames_received: 3,
            snapshots_written: 0,
            elapsed_secs: 1.5,
            stats: PipelineStats {
                frames_presented: 3,
                last_pts: Some(MediaTime(1200)),
                ..Default::default()
            },
        };

        let dir = scratch_dir("summary");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("stats.json");
        write_summary(&summary, Some(&path)).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["preset"], "sample-queue");
        assert_eq!(value["state"], "finished");
        assert_eq!(value["stats"]["frames_presented"], 3);
        assert_eq!(value["stats"]["last_pts"], 1200);
        fs::remove_dir_all(&dir).unwrap();
    }
}
