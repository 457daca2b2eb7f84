// 解码显示管线

pub mod converter;
pub mod decoder;
pub mod demuxer;
pub mod demuxer_source;
pub mod factory;
pub mod hw_decoder;
pub mod pipeline;
pub mod runtime;
pub mod sink;

pub use converter::{PixelConverter, ScalingConverter};
pub use decoder::{DecodedFrame, FrameDecoder, VideoDecoder};
pub use demuxer::Demuxer;
pub use demuxer_source::PacketSource;
pub use factory::{FrameOutput, PipelineFactory};
pub use hw_decoder::{choose_pixel_format, HWAccelType};
pub use pipeline::{Pipeline, PipelineControl, PipelineHandle};
pub use runtime::FfmpegRuntime;
pub use sink::{
    BitmapImage, BitmapReceiver, BitmapSink, PresentationSink, QueueDisplay, QueueSink,
    SampleBuffer,
};
