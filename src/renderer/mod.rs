// 显示：帧 → RgbaImage → egui 纹理

pub mod egui_video_renderer;
pub mod frame_image;

pub use egui_video_renderer::EguiVideoRenderer;
pub use frame_image::DisplayImageConverter;
