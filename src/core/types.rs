use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 媒体源类型
#[derive(Debug, Clone)]
pub enum MediaSource {
    /// 本地文件路径
    LocalFile(PathBuf),

    /// 网络流 URL
    NetworkStream {
        url: String,
        protocol: StreamProtocol,
    },
}

impl MediaSource {
    /// 从 URL 字符串解析媒体源
    pub fn from_url(url: &str) -> Self {
        let url = url.trim();
        let protocol = if url.starts_with("rtsp://") {
            Some(StreamProtocol::RTSP)
        } else if url.starts_with("rtmp://") {
            Some(StreamProtocol::RTMP)
        } else if url.contains(".m3u8") || url.contains("/hls/") {
            Some(StreamProtocol::HLS)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Some(StreamProtocol::HTTP)
        } else {
            None
        };

        match protocol {
            Some(protocol) => MediaSource::NetworkStream {
                url: url.to_string(),
                protocol,
            },
            // 默认当作本地文件
            None => MediaSource::LocalFile(PathBuf::from(url)),
        }
    }

    /// 判断是否为网络流
    pub fn is_network_stream(&self) -> bool {
        matches!(self, MediaSource::NetworkStream { .. })
    }

    /// 交给 FFmpeg 打开的地址
    pub fn location(&self) -> String {
        match self {
            MediaSource::LocalFile(path) => path.to_string_lossy().to_string(),
            MediaSource::NetworkStream { url, .. } => url.clone(),
        }
    }
}

/// 流媒体协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProtocol {
    /// RTSP - 实时流协议（监控摄像头）
    RTSP,
    /// RTMP - 实时消息协议（直播流）
    RTMP,
    /// HLS - HTTP Live Streaming
    HLS,
    /// HTTP - 普通 HTTP 流
    HTTP,
}

impl StreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::RTSP => "RTSP",
            StreamProtocol::RTMP => "RTMP",
            StreamProtocol::HLS => "HLS",
            StreamProtocol::HTTP => "HTTP",
        }
    }
}

/// FFmpeg 的 AV_NOPTS_VALUE
pub const NO_TIMESTAMP: i64 = i64::MIN;

/// 未设置的时间戳一律按 0 处理
pub fn normalize_timestamp(ts: Option<i64>) -> i64 {
    match ts {
        Some(NO_TIMESTAMP) | None => 0,
        Some(ts) => ts,
    }
}

/// 流时间基（有理数，秒/单位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 时间基单位 → 秒
    pub fn to_seconds(&self, ts: i64) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        ts as f64 * self.num as f64 / self.den as f64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        // FFmpeg 的 AV_TIME_BASE_Q
        Self::new(1, 1_000_000)
    }
}

impl From<ffmpeg_next::Rational> for TimeBase {
    fn from(r: ffmpeg_next::Rational) -> Self {
        Self::new(r.numerator(), r.denominator())
    }
}

/// 显示时间戳，单位为 1/600 秒
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MediaTime(pub i64);

impl MediaTime {
    /// 每秒刻度数
    pub const TIMESCALE: i64 = 600;

    pub const ZERO: MediaTime = MediaTime(0);

    pub fn from_seconds(seconds: f64) -> Self {
        MediaTime((seconds * Self::TIMESCALE as f64).round() as i64)
    }

    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / Self::TIMESCALE as f64
    }

    /// 后一个最小刻度
    pub fn next_tick(&self) -> Self {
        MediaTime(self.0.saturating_add(1))
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, Self::TIMESCALE)
    }
}

/// 打开后的视频流信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub video_stream_index: usize,
    pub audio_stream_index: Option<usize>,
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    pub time_base: TimeBase,
    pub fps: f64,
    pub source: String,
}

impl StreamInfo {
    /// 只有视频流的简单描述（测试和合成源使用）
    pub fn video_only(video_stream_index: usize, width: u32, height: u32, time_base: TimeBase) -> Self {
        Self {
            video_stream_index,
            audio_stream_index: None,
            codec_name: String::new(),
            width,
            height,
            time_base,
            fps: 0.0,
            source: String::new(),
        }
    }
}

/// 解封装出的一个压缩数据包
#[derive(Debug)]
pub struct CodedPacket<P = Vec<u8>> {
    pub stream_index: usize,
    pub payload: P,
}

/// 显示缓冲的像素布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLayout {
    /// 单平面 RGBA
    Rgba,
    /// Y 平面 + 交错 UV 平面
    Nv12,
}

impl PixelLayout {
    /// 各平面 (每行字节数, 行数)
    pub fn plane_dims(&self, width: u32, height: u32) -> Vec<(usize, usize)> {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelLayout::Rgba => vec![(w * 4, h)],
            PixelLayout::Nv12 => vec![(w, h), (w.div_ceil(2) * 2, h.div_ceil(2))],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PixelLayout::Rgba => "RGBA",
            PixelLayout::Nv12 => "NV12",
        }
    }
}

/// 紧凑排列的像素平面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    pub stride: usize,
}

impl Plane {
    /// 从带填充的源数据拷贝出紧凑平面
    pub fn packed(src: &[u8], src_stride: usize, row_bytes: usize, rows: usize) -> Option<Self> {
        if src_stride < row_bytes {
            return None;
        }
        if rows > 0 && src.len() < (rows - 1) * src_stride + row_bytes {
            return None;
        }

        let mut data = vec![0u8; row_bytes * rows];
        for y in 0..rows {
            let src_offset = y * src_stride;
            let dst_offset = y * row_bytes;
            data[dst_offset..dst_offset + row_bytes]
                .copy_from_slice(&src[src_offset..src_offset + row_bytes]);
        }

        Some(Self {
            data,
            stride: row_bytes,
        })
    }
}

/// 转换后、可交给显示端的帧
#[derive(Debug, Clone)]
pub struct PresentableBuffer {
    pub layout: PixelLayout,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Plane>,
}

impl PresentableBuffer {
    /// 检查平面数量和大小是否与布局一致
    pub fn is_consistent(&self) -> bool {
        let dims = self.layout.plane_dims(self.width, self.height);
        dims.len() == self.planes.len()
            && dims
                .iter()
                .zip(&self.planes)
                .all(|(&(row_bytes, rows), plane)| {
                    plane.stride >= row_bytes && plane.data.len() >= plane.stride * rows
                })
    }
}

/// 管线状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Opening,
    Playing,
    Finished,
    Stopped,
    Failed(String),
}

/// 管线统计（用于监控和调试）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// 读取的全部数据包
    pub packets_read: u64,
    /// 其中属于视频流的数据包
    pub video_packets: u64,
    pub frames_decoded: u64,
    pub frames_presented: u64,
    /// 显示端未就绪而丢弃的帧
    pub frames_dropped: u64,
    pub conversion_failures: u64,
    pub decode_errors: u64,
    pub last_pts: Option<MediaTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_source_from_url() {
        let hls = MediaSource::from_url("https://example.com/live/index.m3u8");
        assert!(matches!(
            hls,
            MediaSource::NetworkStream { protocol: StreamProtocol::HLS, .. }
        ));

        let http = MediaSource::from_url("http://example.com/clip.mp4");
        assert!(matches!(
            http,
            MediaSource::NetworkStream { protocol: StreamProtocol::HTTP, .. }
        ));

        let rtsp = MediaSource::from_url("rtsp://camera.local/stream");
        assert!(rtsp.is_network_stream());

        let file = MediaSource::from_url("/tmp/movie.mkv");
        assert!(!file.is_network_stream());
        assert_eq!(file.location(), "/tmp/movie.mkv");
    }

    #[test]
    fn test_unset_timestamp_is_zero() {
        assert_eq!(normalize_timestamp(None), 0);
        assert_eq!(normalize_timestamp(Some(NO_TIMESTAMP)), 0);
        assert_eq!(normalize_timestamp(Some(42)), 42);
    }

    #[test]
    fn test_time_base_to_seconds() {
        assert_eq!(TimeBase::new(1, 1).to_seconds(2), 2.0);
        assert_eq!(TimeBase::new(1, 90_000).to_seconds(45_000), 0.5);
        assert_eq!(TimeBase::new(1, 0).to_seconds(10), 0.0);
    }

    #[test]
    fn test_media_time_from_seconds() {
        assert_eq!(MediaTime::from_seconds(1.0), MediaTime(600));
        assert_eq!(MediaTime::from_seconds(0.04), MediaTime(24));
        assert_eq!(MediaTime(300).as_seconds(), 0.5);
    }

    #[test]
    fn test_plane_packed_strips_padding() {
        // 2 行，每行 3 字节有效数据，步长 5
        let src = [1, 2, 3, 0, 0, 4, 5, 6, 0, 0];
        let plane = Plane::packed(&src, 5, 3, 2).unwrap();
        assert_eq!(plane.data, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(plane.stride, 3);

        // 源数据不够
        assert!(Plane::packed(&src[..6], 5, 3, 2).is_none());
        // 步长小于行宽
        assert!(Plane::packed(&src, 2, 3, 2).is_none());
    }

    #[test]
    fn test_nv12_plane_dims_odd_size() {
        let dims = PixelLayout::Nv12.plane_dims(5, 3);
        assert_eq!(dims, vec![(5, 3), (6, 2)]);
        assert_eq!(PixelLayout::Rgba.plane_dims(5, 3), vec![(20, 3)]);
    }

    #[test]
    fn test_presentable_buffer_consistency() {
        let good = PresentableBuffer {
            layout: PixelLayout::Rgba,
            width: 2,
            height: 2,
            planes: vec![Plane { data: vec![0; 16], stride: 8 }],
        };
        assert!(good.is_consistent());

        let bad = PresentableBuffer {
            layout: PixelLayout::Nv12,
            width: 2,
            height: 2,
            planes: vec![Plane { data: vec![0; 4], stride: 2 }],
        };
        assert!(!bad.is_consistent());
    }
}
