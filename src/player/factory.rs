use crate::core::{MediaSource, PipelineError, PlayerConfig, SinkKind};
use crate::player::hw_decoder::HWAccelType;
use crate::player::sink::{BitmapReceiver, BitmapSink, PresentationSink, QueueDisplay, QueueSink};
use crate::player::{Demuxer, Pipeline, PipelineHandle, ScalingConverter, VideoDecoder};
use log::info;
use std::sync::Arc;

/// UI 侧拿到的帧出口，与预设的显示端对应
pub enum FrameOutput {
    Bitmap(BitmapReceiver),
    Queue(QueueDisplay),
}

/// 管线工厂：按配置组装 数据源 → 解码器 → 转换器 → 显示端
///
/// 打开媒体源等耗时操作都在管线线程内执行，调用方立即拿到句柄：
/// ```ignore
/// let (mut handle, output) = PipelineFactory::spawn(&config);
///
/// // 在 update() 中取帧
/// if let FrameOutput::Bitmap(rx) = &output {
///     if let Some(image) = rx.latest() { /* 显示 */ }
/// }
///
/// handle.stop();
/// ```
pub struct PipelineFactory;

impl PipelineFactory {
    pub fn spawn(config: &PlayerConfig) -> (PipelineHandle, FrameOutput) {
        let kind = config.preset.sink_kind();
        let (sink, output): (Arc<dyn PresentationSink>, FrameOutput) = match kind {
            SinkKind::Bitmap => {
                let (sink, receiver) = BitmapSink::new();
                (sink, FrameOutput::Bitmap(receiver))
            }
            SinkKind::Queue => {
                let (sink, display) = QueueSink::new(config.queue_capacity);
                (sink, FrameOutput::Queue(display))
            }
        };

        let source = MediaSource::from_url(&config.url);
        let hw_type = HWAccelType::resolve(config.effective_hwaccel());
        let paced = config.pacing_enabled();
        let layout = kind.layout();
        let pipeline_sink = sink.clone();

        info!(
            "🔨 创建管线: {}（预设 {:?}，输出 {}，硬解 {}，控速 {}）",
            source.location(),
            config.preset,
            layout.name(),
            hw_type.map_or("无", |kind| kind.name()),
            paced
        );

        let handle = PipelineHandle::spawn(sink, move || {
            match &source {
                MediaSource::LocalFile(path) => info!("📁 打开本地文件: {}", path.display()),
                MediaSource::NetworkStream { url, protocol } => {
                    info!("🌐 打开网络流: {} ({})", url, protocol.as_str())
                }
            }

            // 获取顺序：数据源 → 解码器 → 转换器
            let demuxer = Demuxer::open(&source)?;
            let decoder = {
                let stream = demuxer.video_stream().ok_or(PipelineError::NoVideoStream)?;
                VideoDecoder::from_stream(stream, hw_type)?
            };
            let converter = ScalingConverter::new(layout);

            Ok(Pipeline::new(demuxer, decoder, converter, pipeline_sink).with_pacing(paced))
        });

        (handle, output)
    }
}
