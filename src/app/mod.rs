pub mod headless;

use egui::{Context, FontData, FontDefinitions, FontFamily, Ui};
use log::{error, info, warn};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::core::{MediaTime, PipelineState, PipelineStats, PlayerConfig, Result};
use crate::player::{FrameOutput, PipelineFactory, PipelineHandle};
use crate::renderer::{DisplayImageConverter, EguiVideoRenderer};

/// 视频窗口：显示管线最新的一帧和一行状态
pub struct StreamViewApp {
    config: PlayerConfig,

    /// 当前管线（重新加载时替换）
    pipeline: Option<PipelineHandle>,
    output: Option<FrameOutput>,
    /// 已请求停止、等待线程退出的旧管线（UI 线程不阻塞等待）
    retired: Vec<PipelineHandle>,

    video_renderer: EguiVideoRenderer,
    display_converter: DisplayImageConverter,

    /// 已显示的帧数（用于 --max-frames）
    frames_shown: u64,
    info_panel_visible: bool,
    perf_stats: PerformanceStats,
}

struct PerformanceStats {
    fps: f32,
    frame_count: u32,
    last_fps_update: Instant,
}

impl Default for PerformanceStats {
    fn default() -> Self {
        Self {
            fps: 0.0,
            frame_count: 0,
            last_fps_update: Instant::now(),
        }
    }
}

impl StreamViewApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: PlayerConfig) -> Self {
        info!("🎮 初始化 StreamViewApp");

        Self::setup_chinese_fonts(&cc.egui_ctx);

        let mut app = Self {
            config,
            pipeline: None,
            output: None,
            retired: Vec::new(),
            video_renderer: EguiVideoRenderer::new(),
            display_converter: DisplayImageConverter::new(),
            frames_shown: 0,
            info_panel_visible: false,
            perf_stats: PerformanceStats::default(),
        };
        app.start_pipeline();
        app
    }

    /// 配置中文字体支持
    fn setup_chinese_fonts(ctx: &Context) {
        let mut fonts = FontDefinitions::default();

        #[cfg(target_os = "windows")]
        let chinese_font_paths = ["C:/Windows/Fonts/msyh.ttc", "C:/Windows/Fonts/simhei.ttf"];

        #[cfg(target_os = "macos")]
        let chinese_font_paths = [
            "/System/Library/Fonts/PingFang.ttc",
            "/System/Library/Fonts/STHeiti Light.ttc",
        ];

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let chinese_font_paths = [
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        ];

        let loaded = chinese_font_paths
            .iter()
            .filter(|path| Path::new(path).exists())
            .find_map(|path| match std::fs::read(path) {
                Ok(data) => Some((path, data)),
                Err(e) => {
                    warn!("⚠️ 无法读取字体文件 {}: {}", path, e);
                    None
                }
            });

        match loaded {
            Some((path, data)) => {
                fonts
                    .font_data
                    .insert("chinese_font".to_owned(), FontData::from_owned(data));
                for family in [FontFamily::Proportional, FontFamily::Monospace] {
                    if let Some(list) = fonts.families.get_mut(&family) {
                        list.insert(0, "chinese_font".to_owned());
                    }
                }
                info!("✅ 成功加载中文字体: {}", path);
            }
            None => warn!("⚠️ 未找到可用的中文字体文件，中文可能显示为方块"),
        }

        ctx.set_fonts(fonts);
    }

    fn start_pipeline(&mut self) {
        self.retire_pipeline();
        let (handle, output) = PipelineFactory::spawn(&self.config);
        self.pipeline = Some(handle);
        self.output = Some(output);
        self.frames_shown = 0;
    }

    /// 只请求停止，不在 UI 线程等待解码线程
    fn request_stop(&self) {
        if let Some(handle) = &self.pipeline {
            handle.control().request_stop();
        }
    }

    /// 当前管线请求停止后移入待回收列表
    fn retire_pipeline(&mut self) {
        if let Some(handle) = self.pipeline.take() {
            handle.control().request_stop();
            self.retired.push(handle);
        }
        self.output = None;
        self.video_renderer.cleanup();
    }

    /// 回收已经退出的旧管线
    fn reap_retired(&mut self) {
        self.retired.retain_mut(|handle| {
            if !handle.is_finished() {
                return true;
            }
            Self::log_stop_result(handle.stop());
            false
        });
    }

    fn log_stop_result(result: Option<Result<PipelineStats>>) {
        match result {
            Some(Ok(stats)) => info!("管线已停止: {:?}", stats),
            Some(Err(e)) => error!("❌ 管线结束时出错: {}", e),
            None => {}
        }
    }

    /// 从显示端取一帧上传为纹理
    fn pull_frame(&mut self, ctx: &Context) {
        let frame = match self.output.as_mut() {
            Some(FrameOutput::Bitmap(receiver)) => {
                receiver.latest().map(|bitmap| (bitmap.image, bitmap.pts))
            }
            Some(FrameOutput::Queue(display)) => {
                if display.take_cleared() {
                    self.video_renderer.cleanup();
                }
                display
                    .take_due(Instant::now())
                    .and_then(|sample| match self.display_converter.to_image(&sample.buffer) {
                        Ok(image) => Some((image, sample.pts)),
                        Err(e) => {
                            warn!("显示转换失败: {}", e);
                            None
                        }
                    })
            }
            None => None,
        };

        if let Some((image, pts)) = frame {
            self.video_renderer.update_frame(ctx, &image, pts);
            self.frames_shown += 1;
            self.perf_stats.frame_count += 1;
        }

        if let Some(max) = self.config.max_frames {
            let running = self.pipeline.as_ref().is_some_and(|handle| !handle.is_finished());
            if self.frames_shown >= max && running {
                if !self.pipeline.as_ref().is_some_and(|h| h.control().is_stop_requested()) {
                    info!("🏁 已显示 {} 帧，停止管线", self.frames_shown);
                    self.request_stop();
                }
            }
        }
    }

    fn update_performance_stats(&mut self) {
        let elapsed = self.perf_stats.last_fps_update.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.perf_stats.fps = self.perf_stats.frame_count as f32 / elapsed.as_secs_f32();
            self.perf_stats.frame_count = 0;
            self.perf_stats.last_fps_update = Instant::now();
        }
    }

    fn status_line(&self) -> (String, egui::Color32) {
        let Some(handle) = &self.pipeline else {
            return ("未启动".to_string(), egui::Color32::GRAY);
        };

        let stats = handle.stats();
        let counters = format!(
            "解码 {} · 显示 {} · 丢弃 {} · 转换失败 {} · {:.1} fps",
            stats.frames_decoded,
            stats.frames_presented,
            stats.frames_dropped,
            stats.conversion_failures,
            self.perf_stats.fps
        );
        let pts = stats.last_pts.unwrap_or(MediaTime::ZERO);

        match handle.state() {
            PipelineState::Idle | PipelineState::Opening => {
                ("正在连接...".to_string(), egui::Color32::YELLOW)
            }
            PipelineState::Playing => (
                format!("▶ 播放中 {:.2}s · {}", pts.as_seconds(), counters),
                egui::Color32::LIGHT_GREEN,
            ),
            PipelineState::Finished => {
                (format!("⏹ 播放结束 · {}", counters), egui::Color32::LIGHT_GRAY)
            }
            PipelineState::Stopped => {
                (format!("⏹ 已停止 · {}", counters), egui::Color32::LIGHT_GRAY)
            }
            PipelineState::Failed(reason) => {
                (format!("❌ 启动失败: {}", reason), egui::Color32::LIGHT_RED)
            }
        }
    }

    fn render_status_bar(&self, ctx: &Context) {
        egui::TopBottomPanel::bottom("status_bar")
            .frame(egui::Frame::none().fill(egui::Color32::from_rgb(29, 29, 29)))
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.add_space(12.0);
                    if matches!(
                        self.pipeline.as_ref().map(PipelineHandle::state),
                        Some(PipelineState::Idle | PipelineState::Opening)
                    ) {
                        ui.spinner();
                    }
                    let (text, color) = self.status_line();
                    ui.label(egui::RichText::new(text).color(color).size(13.0));
                });
            });
    }

    fn render_video_area(&mut self, ui: &mut Ui) {
        let rect = ui.available_rect_before_wrap();
        if self.video_renderer.has_texture() {
            self.video_renderer.render(ui, rect);
        } else {
            self.render_placeholder(ui, rect);
        }
    }

    fn render_placeholder(&self, ui: &mut Ui, rect: egui::Rect) {
        ui.allocate_ui_at_rect(rect, |ui| {
            ui.centered_and_justified(|ui| {
                ui.vertical_centered(|ui| {
                    ui.add_space(60.0);
                    ui.label(egui::RichText::new("🎬").size(64.0).color(egui::Color32::GRAY));
                    ui.add_space(10.0);
                    ui.label(
                        egui::RichText::new(&self.config.url)
                            .size(14.0)
                            .color(egui::Color32::GRAY),
                    );
                });
            });
        });
    }

    fn render_info_panel(&self, ctx: &Context) {
        if !self.info_panel_visible {
            return;
        }

        egui::Window::new("Stream Info")
            .anchor(egui::Align2::LEFT_TOP, egui::Vec2::new(10.0, 10.0))
            .resizable(false)
            .collapsible(false)
            .frame(egui::Frame::window(&ctx.style()).fill(egui::Color32::from_black_alpha(200)))
            .show(ctx, |ui| {
                let line = |ui: &mut Ui, text: String| {
                    ui.label(egui::RichText::new(text).size(12.0).color(egui::Color32::WHITE));
                };

                line(ui, format!("URL: {}", self.config.url));
                line(ui, format!("Preset: {:?}", self.config.preset));
                line(ui, format!("Pacing: {}", self.config.pacing_enabled()));
                if let Some(handle) = &self.pipeline {
                    let stats = handle.stats();
                    ui.separator();
                    line(ui, format!("Packets: {} ({} video)", stats.packets_read, stats.video_packets));
                    line(ui, format!("Decode errors: {}", stats.decode_errors));
                }
                let render_stats = self.video_renderer.stats();
                line(
                    ui,
                    format!(
                        "Texture updates: {} · Rendered: {}",
                        render_stats.texture_updates, render_stats.frames_rendered
                    ),
                );
            });
    }

    fn handle_keyboard_input(&mut self, ctx: &Context) {
        let (reload, stop, toggle_info) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::R),
                i.key_pressed(egui::Key::S),
                i.key_pressed(egui::Key::Tab),
            )
        });

        if reload {
            info!("🔄 重新加载: {}", self.config.url);
            self.start_pipeline();
        }
        if stop {
            info!("⏹ 请求停止管线");
            self.request_stop();
        }
        if toggle_info {
            self.info_panel_visible = !self.info_panel_visible;
        }
    }
}

impl eframe::App for StreamViewApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.pull_frame(ctx);
        self.reap_retired();
        self.update_performance_stats();

        self.render_status_bar(ctx);
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                self.render_video_area(ui);
            });
        self.render_info_panel(ctx);

        self.handle_keyboard_input(ctx);

        ctx.request_repaint_after(Duration::from_millis(16));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("🔚 StreamViewApp 退出");
        // 退出时可以阻塞等待所有解码线程
        self.retire_pipeline();
        for mut handle in self.retired.drain(..) {
            Self::log_stop_result(handle.stop());
        }
    }
}
