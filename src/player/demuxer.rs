use crate::core::{CodedPacket, MediaSource, PipelineError, Result, StreamInfo};
use crate::player::demuxer_source::PacketSource;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, media};
use log::{debug, info};

/// 解封装器 - 负责打开媒体源并读取视频流数据包
pub struct Demuxer {
    input_ctx: format::context::Input,
    info: StreamInfo,
}

impl Demuxer {
    /// 打开媒体源
    pub fn open(source: &MediaSource) -> Result<Self> {
        let location = source.location();
        info!("正在打开媒体源: {}", location);

        let input_ctx = if source.is_network_stream() {
            info!("🌐 检测到网络流，应用网络选项");
            format::input_with_dictionary(&location, Self::network_options(&location))
                .map_err(|e| PipelineError::OpenFailed(format!("{}: {}", location, e)))?
        } else {
            format::input(&location)
                .map_err(|e| PipelineError::OpenFailed(format!("{}: {}", location, e)))?
        };

        let info = Self::probe(&input_ctx, &location)?;
        info!(
            "✅ 打开成功: {} {}x{}, 时间基 {}/{}",
            info.codec_name, info.width, info.height, info.time_base.num, info.time_base.den
        );

        Ok(Self { input_ctx, info })
    }

    /// 网络流的 FFmpeg 选项
    fn network_options(location: &str) -> ffmpeg::Dictionary<'static> {
        let mut options = ffmpeg::Dictionary::new();

        // discardcorrupt: 丢弃损坏的帧；genpts: 生成缺失的 PTS
        options.set("fflags", "+discardcorrupt+genpts");

        options.set("analyzeduration", "5000000");
        options.set("probesize", "10000000");

        options.set("timeout", "15000000");
        options.set("rw_timeout", "8000000");
        options.set("reconnect", "1");
        options.set("reconnect_streamed", "1");
        options.set("reconnect_delay_max", "4");

        if location.contains(".m3u8") {
            debug!("🎬 HLS 流，应用 HLS 选项");
            options.set("live_start_index", "-1");
            options.set("max_reload", "10");
            options.set("http_persistent", "1");
        }

        options
    }

    /// 选出第一条视频流并检查解码器
    fn probe(input_ctx: &format::context::Input, location: &str) -> Result<StreamInfo> {
        let video_stream = input_ctx
            .streams()
            .find(|s| s.parameters().medium() == media::Type::Video)
            .ok_or(PipelineError::NoVideoStream)?;

        let audio_stream_index = input_ctx
            .streams()
            .best(media::Type::Audio)
            .map(|s| s.index());

        let parameters = video_stream.parameters();
        let codec_id = parameters.id();
        let codec_name = codec_id.name().to_string();

        if codec::decoder::find(codec_id).is_none() {
            return Err(PipelineError::DecoderNotFound(codec_name));
        }

        // codecpar 里直接带着尺寸，不必为此打开解码器
        let (width, height) = unsafe {
            let par = parameters.as_ptr();
            ((*par).width.max(0) as u32, (*par).height.max(0) as u32)
        };

        let fps = video_stream.avg_frame_rate();
        let fps = if fps.denominator() != 0 {
            fps.numerator() as f64 / fps.denominator() as f64
        } else {
            0.0
        };

        debug!("视频流索引: {}", video_stream.index());
        debug!("音频流索引: {:?}", audio_stream_index);

        Ok(StreamInfo {
            video_stream_index: video_stream.index(),
            audio_stream_index,
            codec_name,
            width,
            height,
            time_base: video_stream.time_base().into(),
            fps,
            source: location.to_string(),
        })
    }

    /// 获取视频流（用于创建解码器）
    pub fn video_stream(&self) -> Option<format::stream::Stream<'_>> {
        self.input_ctx.stream(self.info.video_stream_index)
    }
}

impl PacketSource for Demuxer {
    type Packet = ffmpeg::Packet;

    fn read_packet(&mut self) -> Result<Option<CodedPacket<ffmpeg::Packet>>> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input_ctx) {
            Ok(()) => Ok(Some(CodedPacket {
                stream_index: packet.stream(),
                payload: packet,
            })),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.info.source)
    }
}

impl Drop for Demuxer {
    fn drop(&mut self) {
        debug!("🧹 关闭输入: {}", self.info.source);
    }
}
