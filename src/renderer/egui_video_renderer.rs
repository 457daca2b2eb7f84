use crate::core::MediaTime;
use egui::{ColorImage, Rect, TextureHandle, TextureOptions, Ui};
use image::RgbaImage;
use log::{debug, info};

/// egui 视频渲染器：把最新一帧上传为纹理，按比例居中绘制
pub struct EguiVideoRenderer {
    video_texture: Option<VideoTexture>,
    stats: RenderStats,
}

struct VideoTexture {
    egui_handle: TextureHandle,
    width: u32,
    height: u32,
    last_pts: MediaTime,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RenderStats {
    pub frames_rendered: u64,
    pub texture_updates: u64,
}

impl EguiVideoRenderer {
    pub fn new() -> Self {
        info!("🎨 初始化 EguiVideoRenderer");
        Self {
            video_texture: None,
            stats: RenderStats::default(),
        }
    }

    /// 上传新帧；同一 pts 的帧不重复上传
    pub fn update_frame(&mut self, ctx: &egui::Context, image: &RgbaImage, pts: MediaTime) {
        let (width, height) = image.dimensions();
        let color_image =
            ColorImage::from_rgba_unmultiplied([width as usize, height as usize], image.as_raw());

        match &mut self.video_texture {
            Some(texture) if texture.width == width && texture.height == height => {
                if texture.last_pts == pts {
                    return;
                }
                texture.egui_handle.set(color_image, TextureOptions::LINEAR);
                texture.last_pts = pts;
            }
            _ => {
                info!("🆕 创建新视频纹理: {}x{}", width, height);
                let egui_handle = ctx.load_texture("video_frame", color_image, TextureOptions::LINEAR);
                self.video_texture = Some(VideoTexture {
                    egui_handle,
                    width,
                    height,
                    last_pts: pts,
                });
            }
        }

        debug!("📺 更新视频纹理: {}x{}, pts {}", width, height, pts);
        self.stats.texture_updates += 1;
    }

    /// 保持宽高比居中绘制
    pub fn render(&mut self, ui: &mut Ui, rect: Rect) {
        let Some(video_texture) = &self.video_texture else {
            return;
        };

        let display_size = fit_size(
            egui::Vec2::new(video_texture.width as f32, video_texture.height as f32),
            rect.size(),
        );
        let display_rect = Rect::from_center_size(rect.center(), display_size);

        ui.allocate_ui_at_rect(display_rect, |ui| {
            ui.add(egui::Image::from_texture(&video_texture.egui_handle).fit_to_exact_size(display_size));
        });
        self.stats.frames_rendered += 1;
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn has_texture(&self) -> bool {
        self.video_texture.is_some()
    }

    /// 清掉当前画面
    pub fn cleanup(&mut self) {
        if self.video_texture.take().is_some() {
            info!("🧹 清理视频纹理");
        }
    }
}

impl Default for EguiVideoRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// 在 `area` 内保持 `video` 宽高比的最大尺寸
pub fn fit_size(video: egui::Vec2, area: egui::Vec2) -> egui::Vec2 {
    if video.x <= 0.0 || video.y <= 0.0 || area.y <= 0.0 {
        return egui::Vec2::ZERO;
    }

    let video_aspect = video.x / video.y;
    let area_aspect = area.x / area.y;

    if video_aspect > area_aspect {
        // 视频更宽，以宽度为准
        egui::Vec2::new(area.x, area.x / video_aspect)
    } else {
        egui::Vec2::new(area.y * video_aspect, area.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_size_keeps_aspect() {
        let wide = fit_size(egui::Vec2::new(1920.0, 1080.0), egui::Vec2::new(800.0, 800.0));
        assert_eq!(wide, egui::Vec2::new(800.0, 450.0));

        let tall = fit_size(egui::Vec2::new(1080.0, 1920.0), egui::Vec2::new(800.0, 800.0));
        assert_eq!(tall, egui::Vec2::new(450.0, 800.0));

        assert_eq!(fit_size(egui::Vec2::ZERO, egui::Vec2::new(10.0, 10.0)), egui::Vec2::ZERO);
    }
}
