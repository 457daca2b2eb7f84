use anyhow::{Context as _, Result};
use clap::Parser;
use log::info;

mod app;
mod cli;
mod core;
mod player;
mod renderer;

use app::StreamViewApp;
use cli::Args;
use player::FfmpegRuntime;

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    env_logger::Builder::new()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        // 过滤掉 wgpu_hal 和 wgpu_core 的警告日志，减少日志噪音
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .filter_module("wgpu_core", log::LevelFilter::Error)
        .parse_default_env()
        .init();

    let config = args.into_config().context("参数错误")?;
    info!("🎬 stream-view 启动: {} ({:?})", config.url, config.preset);

    let _ffmpeg = FfmpegRuntime::init().context("FFmpeg 初始化失败")?;

    if config.headless {
        let summary = app::headless::run(&config)?;
        app::headless::write_summary(&summary, config.stats_json.as_deref())?;
        return Ok(());
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_min_inner_size([480.0, 270.0])
            .with_title(format!("stream-view - {}", config.url)),
        renderer: eframe::Renderer::Wgpu,
        ..Default::default()
    };

    eframe::run_native(
        "stream-view",
        options,
        Box::new(move |cc| Box::new(StreamViewApp::new(cc, config))),
    )
    .map_err(|e| anyhow::anyhow!("应用启动失败: {}", e))?;

    Ok(())
}
