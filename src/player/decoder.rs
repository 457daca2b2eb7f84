use crate::core::{PipelineError, Result};
use crate::player::hw_decoder::{transfer_to_cpu, HWAccelType, HwAccel, HwDeviceContext};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, util};
use log::{debug, info, warn};

/// 解码后的一帧（像素格式、尺寸、时间戳）
pub trait DecodedFrame {
    fn pixel_format(&self) -> format::Pixel;

    fn frame_width(&self) -> u32;

    fn frame_height(&self) -> u32;

    /// 时间基单位的显示时间戳，None 表示未设置
    fn presentation_timestamp(&self) -> Option<i64>;
}

impl DecodedFrame for util::frame::Video {
    fn pixel_format(&self) -> format::Pixel {
        self.format()
    }

    fn frame_width(&self) -> u32 {
        self.width()
    }

    fn frame_height(&self) -> u32 {
        self.height()
    }

    fn presentation_timestamp(&self) -> Option<i64> {
        // best_effort_timestamp，AV_NOPTS_VALUE 时为 None
        self.timestamp()
    }
}

/// 解码器抽象接口
pub trait FrameDecoder: Send {
    type Packet;
    type Frame: DecodedFrame;

    /// 送入一个数据包，取出 0~n 帧
    fn decode(&mut self, packet: &Self::Packet) -> Result<Vec<Self::Frame>>;

    /// 刷新解码器（获取缓冲的帧）
    fn flush(&mut self) -> Result<Vec<Self::Frame>>;

    /// 获取解码器类型信息
    fn info(&self) -> String;
}

/// 视频解码器（支持硬件加速和软件解码）
pub struct VideoDecoder {
    decoder: codec::decoder::Video,
    // 必须在 decoder 之后释放
    hw: Option<HwAccel>,
}

impl VideoDecoder {
    /// 从视频流创建解码器
    ///
    /// `hw_type` 为 Some 时尝试硬件加速，设备创建失败则继续使用软件解码
    pub fn from_stream(stream: format::stream::Stream, hw_type: Option<HWAccelType>) -> Result<Self> {
        let parameters = stream.parameters();
        let codec_id = parameters.id();

        let codec = codec::decoder::find(codec_id)
            .ok_or_else(|| PipelineError::DecoderNotFound(codec_id.name().to_string()))?;

        let mut context = codec::context::Context::from_parameters(parameters)
            .map_err(|e| PipelineError::CodecOpenFailed(e.to_string()))?;

        unsafe {
            // 0 = 由 FFmpeg 自动决定线程数
            (*context.as_mut_ptr()).thread_count = 0;
        }

        let hw = match hw_type {
            Some(kind) => match HwDeviceContext::create(kind) {
                Ok(device) => Some(unsafe { HwAccel::attach(context.as_mut_ptr(), device) }),
                Err(e) => {
                    warn!("⚠️ {}，回退到软件解码", e);
                    None
                }
            },
            None => None,
        };

        let decoder = context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.video())
            .map_err(|e| PipelineError::CodecOpenFailed(e.to_string()))?;

        debug!(
            "解码器创建成功: {}x{}, 格式: {:?}",
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        let decoder = Self { decoder, hw };
        info!("视频解码器: {}", decoder.info());
        Ok(decoder)
    }

    /// 取出解码器里已就绪的帧
    fn drain(&mut self, frames: &mut Vec<util::frame::Video>) -> Result<()> {
        loop {
            let mut decoded_frame = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(()) => {
                    let frame = match &self.hw {
                        Some(hw) if hw.is_hw_frame(&decoded_frame) => {
                            match transfer_to_cpu(&decoded_frame) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    warn!("{}, 跳过该帧", e);
                                    continue;
                                }
                            }
                        }
                        _ => decoded_frame,
                    };
                    frames.push(frame);
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
                    return Ok(())
                }
                Err(ffmpeg::Error::Eof) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl FrameDecoder for VideoDecoder {
    type Packet = ffmpeg::Packet;
    type Frame = util::frame::Video;

    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<util::frame::Video>> {
        let mut frames = Vec::new();

        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("视频解码器收到 EOF（send_packet），执行 flush 并忽略本次包");
                self.decoder.flush();
                return Ok(frames);
            }
            Err(e) => return Err(e.into()),
        }

        self.drain(&mut frames)?;
        Ok(frames)
    }

    fn flush(&mut self) -> Result<Vec<util::frame::Video>> {
        let mut frames = Vec::new();

        self.decoder.send_eof()?;
        // 刷新阶段的错误只意味着没有更多帧
        if let Err(e) = self.drain(&mut frames) {
            debug!("刷新解码器结束: {}", e);
        }
        self.decoder.flush();

        Ok(frames)
    }

    fn info(&self) -> String {
        match &self.hw {
            Some(hw) => format!(
                "{}x{}, 硬件加速: {}",
                self.decoder.width(),
                self.decoder.height(),
                hw.kind().name()
            ),
            None => format!(
                "{}x{}, 软件解码",
                self.decoder.width(),
                self.decoder.height()
            ),
        }
    }
}
