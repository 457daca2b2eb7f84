use crate::core::{PipelineError, PixelLayout, Plane, PresentableBuffer, Result};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame;
use log::{debug, info};

/// 像素格式转换抽象接口
pub trait PixelConverter: Send {
    type Frame;

    /// 转换为显示端需要的布局
    fn convert(&mut self, frame: &Self::Frame) -> Result<PresentableBuffer>;

    /// 目标布局
    fn target(&self) -> PixelLayout;
}

/// 当前 scaler 对应的输入格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InputKey {
    format: Pixel,
    width: u32,
    height: u32,
}

/// 基于 swscale 的转换器
///
/// 输出帧在整个管线生命周期内复用，输入格式或尺寸变化时才重建
pub struct ScalingConverter {
    target: PixelLayout,
    scaler: Option<(scaling::Context, InputKey)>,
    output: frame::Video,
}

// SwsContext 本身不是 Send，但转换器只在解码线程中使用
unsafe impl Send for ScalingConverter {}

impl ScalingConverter {
    pub fn new(target: PixelLayout) -> Self {
        Self {
            target,
            scaler: None,
            output: frame::Video::empty(),
        }
    }

    fn target_pixel(&self) -> Pixel {
        match self.target {
            PixelLayout::Rgba => Pixel::RGBA,
            PixelLayout::Nv12 => Pixel::NV12,
        }
    }

    /// 按需（重新）创建 scaler
    fn ensure_scaler(&mut self, key: InputKey) -> Result<()> {
        if matches!(&self.scaler, Some((_, current)) if *current == key) {
            return Ok(());
        }

        info!(
            "🔧 初始化像素转换: {:?} {}x{} → {}",
            key.format,
            key.width,
            key.height,
            self.target.name()
        );

        let context = scaling::Context::get(
            key.format,
            key.width,
            key.height,
            self.target_pixel(),
            key.width,
            key.height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| PipelineError::ConversionFailed(format!("创建 scaler 失败: {}", e)))?;

        self.scaler = Some((context, key));
        // 尺寸变了，输出帧重新分配
        self.output = frame::Video::empty();
        Ok(())
    }

    /// 把输出帧拷贝成紧凑平面
    fn pack_output(&self, width: u32, height: u32) -> Result<PresentableBuffer> {
        let planes = self
            .target
            .plane_dims(width, height)
            .into_iter()
            .enumerate()
            .map(|(index, (row_bytes, rows))| {
                Plane::packed(self.output.data(index), self.output.stride(index), row_bytes, rows)
                    .ok_or_else(|| {
                        PipelineError::ConversionFailed(format!("第 {} 个平面数据不足", index))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PresentableBuffer {
            layout: self.target,
            width,
            height,
            planes,
        })
    }
}

impl PixelConverter for ScalingConverter {
    type Frame = frame::Video;

    fn convert(&mut self, input: &frame::Video) -> Result<PresentableBuffer> {
        let key = InputKey {
            format: input.format(),
            width: input.width(),
            height: input.height(),
        };
        if key.width == 0 || key.height == 0 || key.format == Pixel::None {
            return Err(PipelineError::ConversionFailed(format!(
                "无效的输入帧: {:?} {}x{}",
                key.format, key.width, key.height
            )));
        }

        self.ensure_scaler(key)?;

        if let Some((scaler, _)) = self.scaler.as_mut() {
            scaler
                .run(input, &mut self.output)
                .map_err(|e| PipelineError::ConversionFailed(e.to_string()))?;
        }

        self.pack_output(key.width, key.height)
    }

    fn target(&self) -> PixelLayout {
        self.target
    }
}

impl Drop for ScalingConverter {
    fn drop(&mut self) {
        debug!("🧹 释放像素转换器 ({})", self.target.name());
    }
}
