use thiserror::Error;

/// 管线错误
///
/// 打开阶段的错误（`OpenFailed` / `NoVideoStream` / `DecoderNotFound` / `CodecOpenFailed`）
/// 会终止启动；逐帧错误（`ConversionFailed` / `BufferCreateFailed`）只跳过当前帧。
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("无法打开媒体源: {0}")]
    OpenFailed(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("找不到解码器: {0}")]
    DecoderNotFound(String),

    #[error("打开解码器失败: {0}")]
    CodecOpenFailed(String),

    #[error("像素格式转换失败: {0}")]
    ConversionFailed(String),

    #[error("创建显示缓冲失败: {0}")]
    BufferCreateFailed(String),

    #[error("硬件解码设备不可用: {0}")]
    HardwareDeviceUnavailable(String),

    #[error("FFmpeg 错误: {0}")]
    FFmpeg(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("解码线程异常退出: {0}")]
    Worker(String),
}

impl PipelineError {
    /// 逐帧错误，不应终止播放
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            PipelineError::ConversionFailed(_) | PipelineError::BufferCreateFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_frame_classification() {
        assert!(PipelineError::ConversionFailed("x".into()).is_per_frame());
        assert!(PipelineError::BufferCreateFailed("x".into()).is_per_frame());
        assert!(!PipelineError::NoVideoStream.is_per_frame());
        assert!(!PipelineError::OpenFailed("x".into()).is_per_frame());
    }
}
