use crate::core::{PipelineError, PixelLayout, Plane, PresentableBuffer, Result};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame;
use image::RgbaImage;
use log::info;

/// 把显示缓冲转成 RgbaImage，供 egui 纹理和截图使用
///
/// NV12 走 swscale，scaler 按尺寸缓存；RGBA 直接拷贝
pub struct DisplayImageConverter {
    scaler: Option<(scaling::Context, (u32, u32))>,
    input: frame::Video,
    output: frame::Video,
}

impl DisplayImageConverter {
    pub fn new() -> Self {
        Self {
            scaler: None,
            input: frame::Video::empty(),
            output: frame::Video::empty(),
        }
    }

    pub fn to_image(&mut self, buffer: &PresentableBuffer) -> Result<RgbaImage> {
        if !buffer.is_consistent() {
            return Err(PipelineError::ConversionFailed(format!(
                "{} 缓冲与尺寸 {}x{} 不符",
                buffer.layout.name(),
                buffer.width,
                buffer.height
            )));
        }

        match buffer.layout {
            PixelLayout::Rgba => rgba_image(buffer),
            PixelLayout::Nv12 => self.nv12_image(buffer),
        }
    }

    fn nv12_image(&mut self, buffer: &PresentableBuffer) -> Result<RgbaImage> {
        let size = (buffer.width, buffer.height);
        if !matches!(&self.scaler, Some((_, current)) if *current == size) {
            info!("🔧 初始化显示转换: NV12 {}x{} → RGBA", size.0, size.1);
            let context = scaling::Context::get(
                Pixel::NV12,
                size.0,
                size.1,
                Pixel::RGBA,
                size.0,
                size.1,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| PipelineError::ConversionFailed(format!("创建 scaler 失败: {}", e)))?;
            self.scaler = Some((context, size));
            self.input = frame::Video::new(Pixel::NV12, size.0, size.1);
            self.output = frame::Video::empty();
        }

        for (index, plane) in buffer.planes.iter().enumerate() {
            copy_plane_into(plane, &mut self.input, index);
        }

        if let Some((scaler, _)) = self.scaler.as_mut() {
            scaler
                .run(&self.input, &mut self.output)
                .map_err(|e| PipelineError::ConversionFailed(e.to_string()))?;
        }

        let (row_bytes, rows) = (size.0 as usize * 4, size.1 as usize);
        let packed = Plane::packed(self.output.data(0), self.output.stride(0), row_bytes, rows)
            .ok_or_else(|| PipelineError::ConversionFailed("RGBA 输出数据不足".into()))?;

        RgbaImage::from_raw(size.0, size.1, packed.data)
            .ok_or_else(|| PipelineError::ConversionFailed("RGBA 输出尺寸不符".into()))
    }
}

impl Default for DisplayImageConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// 紧凑平面按行拷进 FFmpeg 帧（目标行可能带填充）
fn copy_plane_into(plane: &Plane, target: &mut frame::Video, index: usize) {
    let stride = target.stride(index);
    let row_bytes = plane.stride.min(stride);
    let data = target.data_mut(index);
    for (y, row) in plane.data.chunks(plane.stride).enumerate() {
        let offset = y * stride;
        if offset + row_bytes > data.len() {
            break;
        }
        data[offset..offset + row_bytes].copy_from_slice(&row[..row_bytes.min(row.len())]);
    }
}

fn rgba_image(buffer: &PresentableBuffer) -> Result<RgbaImage> {
    let row_bytes = buffer.width as usize * 4;
    let plane = &buffer.planes[0];
    let packed = Plane::packed(&plane.data, plane.stride, row_bytes, buffer.height as usize)
        .ok_or_else(|| PipelineError::ConversionFailed("RGBA 平面数据不足".into()))?;
    RgbaImage::from_raw(buffer.width, buffer.height, packed.data)
        .ok_or_else(|| PipelineError::ConversionFailed("RGBA 尺寸不符".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nv12_grey(width: u32, height: u32, luma: u8) -> PresentableBuffer {
        let planes = PixelLayout::Nv12
            .plane_dims(width, height)
            .into_iter()
            .enumerate()
            .map(|(index, (row_bytes, rows))| Plane {
                data: vec![if index == 0 { luma } else { 128 }; row_bytes * rows],
                stride: row_bytes,
            })
            .collect();
        PresentableBuffer {
            layout: PixelLayout::Nv12,
            width,
            height,
            planes,
        }
    }

    #[test]
    fn test_rgba_passthrough() {
        let buffer = PresentableBuffer {
            layout: PixelLayout::Rgba,
            width: 2,
            height: 1,
            planes: vec![Plane {
                data: vec![1, 2, 3, 4, 5, 6, 7, 8],
                stride: 8,
            }],
        };
        let image = DisplayImageConverter::new().to_image(&buffer).unwrap();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(1, 0).0, [5, 6, 7, 8]);
    }

    #[test]
    fn test_nv12_grey_converts_to_grey() {
        let mut converter = DisplayImageConverter::new();
        let image = converter.to_image(&nv12_grey(16, 8, 128)).unwrap();
        assert_eq!(image.dimensions(), (16, 8));

        let [r, g, b, a] = image.get_pixel(3, 3).0;
        assert_eq!(a, 255);
        assert!(r.abs_diff(g) <= 2 && g.abs_diff(b) <= 2);

        // 尺寸变化时重建 scaler
        let image = converter.to_image(&nv12_grey(8, 4, 200)).unwrap();
        assert_eq!(image.dimensions(), (8, 4));
    }

    #[test]
    fn test_inconsistent_buffer_is_rejected() {
        let mut buffer = nv12_grey(4, 4, 16);
        buffer.planes.truncate(1);
        assert!(matches!(
            DisplayImageConverter::new().to_image(&buffer),
            Err(PipelineError::ConversionFailed(_))
        ));
    }
}
