use crate::core::{HwAccelChoice, PipelineError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use ffmpeg_next::util;
use log::{debug, info, warn};
use std::os::raw::c_void;
use std::ptr;

/// 硬件解码器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HWAccelType {
    VideoToolbox, // macOS / iOS VideoToolbox
    VAAPI,        // Linux Video Acceleration API
    CUDA,         // NVIDIA CUDA
}

impl HWAccelType {
    /// 获取硬件类型名称
    pub fn name(&self) -> &'static str {
        match self {
            HWAccelType::VideoToolbox => "VideoToolbox",
            HWAccelType::VAAPI => "VAAPI",
            HWAccelType::CUDA => "CUDA",
        }
    }

    /// 根据配置选出硬件类型，Auto 按平台选择
    pub fn resolve(choice: HwAccelChoice) -> Option<Self> {
        match choice {
            HwAccelChoice::None => None,
            HwAccelChoice::VideoToolbox => Some(HWAccelType::VideoToolbox),
            HwAccelChoice::Vaapi => Some(HWAccelType::VAAPI),
            HwAccelChoice::Cuda => Some(HWAccelType::CUDA),
            HwAccelChoice::Auto => Self::platform_default(),
        }
    }

    fn platform_default() -> Option<Self> {
        if cfg!(any(target_os = "macos", target_os = "ios")) {
            Some(HWAccelType::VideoToolbox)
        } else if cfg!(target_os = "linux") {
            Some(HWAccelType::VAAPI)
        } else {
            None
        }
    }

    /// FFmpeg 硬件设备类型
    pub fn device_type(&self) -> ffi::AVHWDeviceType {
        match self {
            HWAccelType::VideoToolbox => ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
            HWAccelType::VAAPI => ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI,
            HWAccelType::CUDA => ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA,
        }
    }

    /// 该硬件解码输出的像素格式
    pub fn hw_pixel_format(&self) -> ffi::AVPixelFormat {
        match self {
            HWAccelType::VideoToolbox => ffi::AVPixelFormat::AV_PIX_FMT_VIDEOTOOLBOX,
            HWAccelType::VAAPI => ffi::AVPixelFormat::AV_PIX_FMT_VAAPI,
            HWAccelType::CUDA => ffi::AVPixelFormat::AV_PIX_FMT_CUDA,
        }
    }
}

/// 从候选格式中选择：有硬件格式就用硬件格式，否则取第一个
pub fn choose_pixel_format<T: Copy + PartialEq>(candidates: &[T], hardware: T) -> Option<T> {
    candidates
        .iter()
        .copied()
        .find(|&format| format == hardware)
        .or_else(|| candidates.first().copied())
}

/// 硬件设备上下文（AVBufferRef 的唯一所有者）
pub struct HwDeviceContext {
    buffer: *mut ffi::AVBufferRef,
    kind: HWAccelType,
}

// AVBufferRef 的引用计数是线程安全的，设备上下文只在解码线程里使用
unsafe impl Send for HwDeviceContext {}

impl HwDeviceContext {
    /// 创建硬件设备上下文
    pub fn create(kind: HWAccelType) -> Result<Self> {
        if !cfg!(feature = "hwaccel") {
            return Err(PipelineError::HardwareDeviceUnavailable(format!(
                "{}: 未启用 hwaccel 特性",
                kind.name()
            )));
        }

        let mut buffer: *mut ffi::AVBufferRef = ptr::null_mut();
        let ret = unsafe {
            ffi::av_hwdevice_ctx_create(
                &mut buffer,
                kind.device_type(),
                ptr::null(),
                ptr::null_mut(),
                0,
            )
        };

        if ret < 0 || buffer.is_null() {
            return Err(PipelineError::HardwareDeviceUnavailable(format!(
                "{}: {}",
                kind.name(),
                ffmpeg::Error::from(ret)
            )));
        }

        debug!("硬件设备上下文创建成功: {}", kind.name());
        Ok(Self { buffer, kind })
    }

    pub fn kind(&self) -> HWAccelType {
        self.kind
    }

    /// 新的引用，交给解码器上下文持有
    fn new_ref(&self) -> *mut ffi::AVBufferRef {
        unsafe { ffi::av_buffer_ref(self.buffer) }
    }
}

impl Drop for HwDeviceContext {
    fn drop(&mut self) {
        if !self.buffer.is_null() {
            debug!("🧹 释放硬件设备上下文: {}", self.kind.name());
            unsafe { ffi::av_buffer_unref(&mut self.buffer) };
        }
    }
}

/// 已挂到解码器上的硬件加速
pub struct HwAccel {
    device: HwDeviceContext,
    // get_format 回调通过 opaque 读取，地址在解码器存活期间不能变
    pixel_format: Box<ffi::AVPixelFormat>,
}

impl HwAccel {
    /// 把硬件设备挂到尚未打开的解码器上下文
    ///
    /// # Safety
    /// `ctx` 必须是有效且尚未 open 的解码器上下文，返回值必须比解码器活得久
    pub unsafe fn attach(ctx: *mut ffi::AVCodecContext, device: HwDeviceContext) -> Self {
        let pixel_format = Box::new(device.kind().hw_pixel_format());

        (*ctx).hw_device_ctx = device.new_ref();
        (*ctx).opaque = &*pixel_format as *const ffi::AVPixelFormat as *mut c_void;
        (*ctx).get_format = Some(get_hw_format);

        info!("✓ 已挂载硬件加速: {}", device.kind().name());
        Self {
            device,
            pixel_format,
        }
    }

    pub fn kind(&self) -> HWAccelType {
        self.device.kind()
    }

    /// 检查是否是硬件帧
    pub fn is_hw_frame(&self, frame: &util::frame::Video) -> bool {
        unsafe { (*frame.as_ptr()).format == *self.pixel_format as i32 }
    }
}

/// get_format 回调：优先选择硬件格式
unsafe extern "C" fn get_hw_format(
    ctx: *mut ffi::AVCodecContext,
    formats: *const ffi::AVPixelFormat,
) -> ffi::AVPixelFormat {
    if formats.is_null() {
        return ffi::AVPixelFormat::AV_PIX_FMT_NONE;
    }

    let mut candidates = Vec::new();
    let mut p = formats;
    while *p != ffi::AVPixelFormat::AV_PIX_FMT_NONE {
        candidates.push(*p);
        p = p.add(1);
    }

    let opaque = (*ctx).opaque as *const ffi::AVPixelFormat;
    let hardware = if opaque.is_null() {
        ffi::AVPixelFormat::AV_PIX_FMT_NONE
    } else {
        *opaque
    };

    choose_pixel_format(&candidates, hardware).unwrap_or(ffi::AVPixelFormat::AV_PIX_FMT_NONE)
}

/// 将硬件帧传输到 CPU 内存
pub fn transfer_to_cpu(hw_frame: &util::frame::Video) -> Result<util::frame::Video> {
    let mut cpu_frame = util::frame::Video::empty();
    unsafe {
        let ret = ffi::av_hwframe_transfer_data(cpu_frame.as_mut_ptr(), hw_frame.as_ptr(), 0);
        if ret < 0 {
            return Err(PipelineError::BufferCreateFailed(format!(
                "硬件帧传输失败: {}",
                ffmpeg::Error::from(ret)
            )));
        }
        // 时间戳等属性不会随数据一起传输
        let ret = ffi::av_frame_copy_props(cpu_frame.as_mut_ptr(), hw_frame.as_ptr());
        if ret < 0 {
            warn!("拷贝帧属性失败: {}", ffmpeg::Error::from(ret));
        }
    }
    Ok(cpu_frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffi::AVPixelFormat::*;

    #[test]
    fn test_choose_hardware_format_when_offered() {
        let candidates = [AV_PIX_FMT_YUV420P, AV_PIX_FMT_VIDEOTOOLBOX, AV_PIX_FMT_NV12];
        assert_eq!(
            choose_pixel_format(&candidates, AV_PIX_FMT_VIDEOTOOLBOX),
            Some(AV_PIX_FMT_VIDEOTOOLBOX)
        );
    }

    #[test]
    fn test_choose_first_format_without_hardware() {
        let candidates = [AV_PIX_FMT_NV12, AV_PIX_FMT_YUV420P];
        assert_eq!(
            choose_pixel_format(&candidates, AV_PIX_FMT_VAAPI),
            Some(AV_PIX_FMT_NV12)
        );
    }

    #[test]
    fn test_choose_from_empty_list() {
        let candidates: [ffi::AVPixelFormat; 0] = [];
        assert_eq!(choose_pixel_format(&candidates, AV_PIX_FMT_CUDA), None);
    }

    #[test]
    fn test_resolve_hwaccel_choice() {
        assert_eq!(HWAccelType::resolve(HwAccelChoice::None), None);
        assert_eq!(
            HWAccelType::resolve(HwAccelChoice::Cuda),
            Some(HWAccelType::CUDA)
        );
        assert_eq!(
            HWAccelType::resolve(HwAccelChoice::VideoToolbox).map(|t| t.hw_pixel_format()),
            Some(AV_PIX_FMT_VIDEOTOOLBOX)
        );
    }
}
