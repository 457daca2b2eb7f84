use crate::core::Result;
use ffmpeg_next as ffmpeg;
use log::{debug, info};

/// FFmpeg 运行时：创建时初始化库和网络模块，drop 时释放网络模块
///
/// 整个进程只需要一个，由 main 持有到退出
pub struct FfmpegRuntime {
    _private: (),
}

impl FfmpegRuntime {
    pub fn init() -> Result<Self> {
        ffmpeg::init()?;
        ffmpeg::format::network::init();
        info!("✅ FFmpeg 初始化成功（含网络模块）");
        Ok(Self { _private: () })
    }
}

impl Drop for FfmpegRuntime {
    fn drop(&mut self) {
        ffmpeg::format::network::deinit();
        debug!("🧹 FFmpeg 网络模块已释放");
    }
}
