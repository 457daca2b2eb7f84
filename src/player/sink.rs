use crate::core::{MediaTime, PipelineError, PixelLayout, PresentableBuffer, Result};
use crossbeam::queue::ArrayQueue;
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbaImage;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 显示端抽象接口
///
/// 显示端属于 UI 线程，解码线程只通过这里的线程安全接口写入
pub trait PresentationSink: Send + Sync {
    /// 需要的像素布局
    fn preferred_layout(&self) -> PixelLayout;

    /// 是否还能接收数据；每次送帧前都要检查
    fn is_ready_for_more_data(&self) -> bool;

    /// 送出一帧，返回 false 表示被丢弃
    fn present(&self, buffer: PresentableBuffer, pts: MediaTime) -> Result<bool>;

    /// 清空尚未显示的数据
    fn flush(&self);
}

// ============= 位图显示 =============

/// 交给 UI 的位图
#[derive(Debug, Clone)]
pub struct BitmapImage {
    pub image: RgbaImage,
    pub pts: MediaTime,
}

/// 位图显示端：RGBA → RgbaImage，发给 UI 线程，不做背压
///
/// 每张图带着发送时的 flush 代数，接收端丢掉 flush 之前发出的图
pub struct BitmapSink {
    tx: Sender<(u64, BitmapImage)>,
    generation: Arc<AtomicU64>,
}

/// UI 线程持有的位图接收端
pub struct BitmapReceiver {
    rx: Receiver<(u64, BitmapImage)>,
    generation: Arc<AtomicU64>,
}

impl BitmapSink {
    pub fn new() -> (Arc<Self>, BitmapReceiver) {
        let (tx, rx) = unbounded();
        let generation = Arc::new(AtomicU64::new(0));
        let sink = Arc::new(Self {
            tx,
            generation: generation.clone(),
        });
        (sink, BitmapReceiver { rx, generation })
    }
}

impl PresentationSink for BitmapSink {
    fn preferred_layout(&self) -> PixelLayout {
        PixelLayout::Rgba
    }

    fn is_ready_for_more_data(&self) -> bool {
        true
    }

    fn present(&self, buffer: PresentableBuffer, pts: MediaTime) -> Result<bool> {
        if buffer.layout != PixelLayout::Rgba {
            return Err(PipelineError::BufferCreateFailed(format!(
                "位图显示端需要 RGBA，收到 {}",
                buffer.layout.name()
            )));
        }

        let (width, height) = (buffer.width, buffer.height);
        let plane = buffer
            .planes
            .into_iter()
            .next()
            .filter(|plane| plane.stride == width as usize * 4)
            .ok_or_else(|| PipelineError::BufferCreateFailed("RGBA 平面缺失或未紧凑排列".into()))?;

        let image = RgbaImage::from_raw(width, height, plane.data).ok_or_else(|| {
            PipelineError::BufferCreateFailed(format!("RGBA 数据与尺寸 {}x{} 不符", width, height))
        })?;

        // 发后不管；接收端已经 drop（UI 已关闭）时 send 失败，该帧丢弃
        let generation = self.generation.load(Ordering::SeqCst);
        Ok(self.tx.send((generation, BitmapImage { image, pts })).is_ok())
    }

    fn flush(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("🧹 位图显示端已清空（代数 {}），队列中 {} 张图作废", generation, self.tx.len());
    }
}

impl BitmapReceiver {
    fn is_current(&self, generation: u64) -> bool {
        generation >= self.generation.load(Ordering::SeqCst)
    }

    /// 取最新的一张，较旧的直接丢弃
    pub fn latest(&self) -> Option<BitmapImage> {
        self.rx
            .try_iter()
            .filter(|(generation, _)| self.is_current(*generation))
            .last()
            .map(|(_, bitmap)| bitmap)
    }

    /// 阻塞等待下一张
    pub fn recv_timeout(&self, timeout: Duration) -> Option<BitmapImage> {
        let deadline = Instant::now() + timeout;
        loop {
            let (generation, bitmap) = self.rx.recv_deadline(deadline).ok()?;
            if self.is_current(generation) {
                return Some(bitmap);
            }
        }
    }
}

// ============= 显示队列 =============

/// 带显示时间的缓冲
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub buffer: PresentableBuffer,
    pub pts: MediaTime,
}

struct QueueShared {
    queue: ArrayQueue<SampleBuffer>,
    flushed: AtomicBool,
}

/// 显示队列：有界、无锁，满了就不再接收
pub struct QueueSink {
    shared: Arc<QueueShared>,
}

/// 到期时间超过现在这么久就认为 pts 跳变
const MAX_SCHEDULE_AHEAD: Duration = Duration::from_secs(2);

/// 显示队列的消费端（UI 线程）
///
/// 第一个取出的样本启动显示时间基，之后按 pts 到期释放；
/// pts 回退或向前跳变超过 `MAX_SCHEDULE_AHEAD` 时以该样本重建时间基
pub struct QueueDisplay {
    shared: Arc<QueueShared>,
    pending: Option<SampleBuffer>,
    timebase: Option<(MediaTime, Instant)>,
    cleared: bool,
}

impl QueueSink {
    pub fn new(capacity: usize) -> (Arc<Self>, QueueDisplay) {
        info!("📥 创建显示队列，容量 {}", capacity);
        let shared = Arc::new(QueueShared {
            queue: ArrayQueue::new(capacity.max(1)),
            flushed: AtomicBool::new(false),
        });
        let display = QueueDisplay {
            shared: shared.clone(),
            pending: None,
            timebase: None,
            cleared: false,
        };
        (Arc::new(Self { shared }), display)
    }
}

impl PresentationSink for QueueSink {
    fn preferred_layout(&self) -> PixelLayout {
        PixelLayout::Nv12
    }

    fn is_ready_for_more_data(&self) -> bool {
        !self.shared.queue.is_full()
    }

    fn present(&self, buffer: PresentableBuffer, pts: MediaTime) -> Result<bool> {
        if !buffer.is_consistent() {
            return Err(PipelineError::BufferCreateFailed(format!(
                "{} 缓冲与尺寸 {}x{} 不符",
                buffer.layout.name(),
                buffer.width,
                buffer.height
            )));
        }

        Ok(self.shared.queue.push(SampleBuffer { buffer, pts }).is_ok())
    }

    fn flush(&self) {
        let mut dropped = 0;
        while self.shared.queue.pop().is_some() {
            dropped += 1;
        }
        self.shared.flushed.store(true, Ordering::SeqCst);
        debug!("🧹 显示队列已清空（丢弃 {} 个样本）", dropped);
    }
}

impl QueueDisplay {
    /// 取出到期的最新样本，更早到期的样本被跳过
    pub fn take_due(&mut self, now: Instant) -> Option<SampleBuffer> {
        if self.shared.flushed.swap(false, Ordering::SeqCst) {
            self.pending = None;
            self.timebase = None;
            self.cleared = true;
        }

        let mut latest = None;
        while let Some(sample) = self.pending.take().or_else(|| self.shared.queue.pop()) {
            let (base_pts, base_instant) = *self.timebase.get_or_insert((sample.pts, now));
            let offset = sample.pts.0.saturating_sub(base_pts.0);
            let due = base_instant + Duration::from_secs_f64(MediaTime(offset.max(0)).as_seconds());

            if offset < 0 || due.saturating_duration_since(now) > MAX_SCHEDULE_AHEAD {
                debug!("⏩ 显示队列 pts 跳变 {} → {}，重建时间基", base_pts, sample.pts);
                self.timebase = Some((sample.pts, now));
                latest = Some(sample);
            } else if due <= now {
                latest = Some(sample);
            } else {
                self.pending = Some(sample);
                break;
            }
        }
        latest
    }

    /// 显示端是否被清空过（调用后复位）
    pub fn take_cleared(&mut self) -> bool {
        std::mem::take(&mut self.cleared)
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.len() + usize::from(self.pending.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Plane;

    fn rgba(width: u32, height: u32) -> PresentableBuffer {
        PresentableBuffer {
            layout: PixelLayout::Rgba,
            width,
            height,
            planes: vec![Plane {
                data: vec![255; (width * height * 4) as usize],
                stride: width as usize * 4,
            }],
        }
    }

    fn nv12(width: u32, height: u32) -> PresentableBuffer {
        let planes = PixelLayout::Nv12
            .plane_dims(width, height)
            .into_iter()
            .map(|(row_bytes, rows)| Plane {
                data: vec![128; row_bytes * rows],
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
    fn test_bitmap_sink_delivers_latest() {
        let (sink, receiver) = BitmapSink::new();
        assert!(sink.is_ready_for_more_data());

        assert!(sink.present(rgba(4, 2), MediaTime(1)).unwrap());
        assert!(sink.present(rgba(4, 2), MediaTime(2)).unwrap());

        let latest = receiver.latest().unwrap();
        assert_eq!(latest.pts, MediaTime(2));
        assert_eq!(latest.image.dimensions(), (4, 2));
        assert!(receiver.latest().is_none());
    }

    #[test]
    fn test_bitmap_sink_rejects_wrong_layout() {
        let (sink, _receiver) = BitmapSink::new();
        let err = sink.present(nv12(4, 2), MediaTime(1)).unwrap_err();
        assert!(matches!(err, PipelineError::BufferCreateFailed(_)));

        let mut short = rgba(4, 2);
        short.planes[0].data.truncate(8);
        assert!(matches!(
            sink.present(short, MediaTime(2)),
            Err(PipelineError::BufferCreateFailed(_))
        ));
    }

    #[test]
    fn test_bitmap_sink_flush_discards_pending() {
        let (sink, receiver) = BitmapSink::new();
        sink.present(rgba(2, 2), MediaTime(1)).unwrap();
        sink.flush();
        assert!(receiver.latest().is_none());
    }

    #[test]
    fn test_bitmap_sink_drops_after_receiver_gone() {
        let (sink, receiver) = BitmapSink::new();
        assert!(sink.present(rgba(2, 2), MediaTime(1)).unwrap());

        drop(receiver);
        // UI 关闭后不再积压，返回丢弃
        assert!(!sink.present(rgba(2, 2), MediaTime(2)).unwrap());
        assert!(!sink.present(rgba(2, 2), MediaTime(3)).unwrap());
    }

    #[test]
    fn test_bitmap_sink_delivers_after_flush() {
        let (sink, receiver) = BitmapSink::new();
        sink.present(rgba(2, 2), MediaTime(1)).unwrap();
        sink.present(rgba(2, 2), MediaTime(2)).unwrap();
        sink.flush();

        sink.present(rgba(2, 2), MediaTime(3)).unwrap();
        let next = receiver.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(next.pts, MediaTime(3));
        assert!(receiver.recv_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_queue_sink_readiness_and_drop() {
        let (sink, display) = QueueSink::new(2);
        assert!(sink.is_ready_for_more_data());

        assert!(sink.present(nv12(4, 4), MediaTime(1)).unwrap());
        assert!(sink.present(nv12(4, 4), MediaTime(2)).unwrap());
        assert!(!sink.is_ready_for_more_data());

        // 满了直接丢弃，不阻塞
        assert!(!sink.present(nv12(4, 4), MediaTime(3)).unwrap());
        assert!(!sink.is_ready_for_more_data());
        assert_eq!(display.queued(), 2);
    }

    #[test]
    fn test_queue_sink_rejects_inconsistent_buffer() {
        let (sink, display) = QueueSink::new(2);
        let mut buffer = nv12(4, 4);
        buffer.planes.pop();
        assert!(matches!(
            sink.present(buffer, MediaTime(1)),
            Err(PipelineError::BufferCreateFailed(_))
        ));
        assert_eq!(display.queued(), 0);
    }

    #[test]
    fn test_queue_display_releases_by_pts() {
        let (sink, mut display) = QueueSink::new(4);
        sink.present(nv12(2, 2), MediaTime(0)).unwrap();
        sink.present(nv12(2, 2), MediaTime(300)).unwrap(); // 0.5s
        sink.present(nv12(2, 2), MediaTime(600)).unwrap(); // 1s

        let t = Instant::now();
        assert_eq!(display.take_due(t).unwrap().pts, MediaTime(0));
        // 0.5s 的样本还没到
        assert!(display.take_due(t + Duration::from_millis(100)).is_none());
        assert_eq!(display.queued(), 2);
        // 1.2s 时两个都到期，只返回最新的
        let sample = display.take_due(t + Duration::from_millis(1200)).unwrap();
        assert_eq!(sample.pts, MediaTime(600));
        assert_eq!(display.queued(), 0);
    }

    #[test]
    fn test_queue_flush_clears_display() {
        let (sink, mut display) = QueueSink::new(4);
        sink.present(nv12(2, 2), MediaTime(0)).unwrap();
        sink.present(nv12(2, 2), MediaTime(600)).unwrap();

        let t = Instant::now();
        display.take_due(t);
        assert_eq!(display.queued(), 1);

        sink.flush();
        assert!(sink.is_ready_for_more_data());
        assert!(display.take_due(t).is_none());
        assert!(display.take_cleared());
        assert!(!display.take_cleared());
        assert_eq!(display.queued(), 0);
    }

    #[test]
    fn test_queue_display_rebases_on_forward_jump() {
        let (sink, mut display) = QueueSink::new(2);
        let jump = MediaTime(3600 * 600);
        sink.present(nv12(2, 2), MediaTime(0)).unwrap();
        sink.present(nv12(2, 2), jump).unwrap();
        assert!(!sink.is_ready_for_more_data());

        let t = Instant::now();
        // 一小时的跳变不能卡住队列
        assert_eq!(display.take_due(t).unwrap().pts, jump);
        assert!(sink.is_ready_for_more_data());
        assert_eq!(display.queued(), 0);

        // 之后按新的时间基计时
        sink.present(nv12(2, 2), MediaTime(jump.0 + 300)).unwrap();
        assert!(display.take_due(t + Duration::from_millis(100)).is_none());
        let sample = display.take_due(t + Duration::from_millis(600)).unwrap();
        assert_eq!(sample.pts, MediaTime(jump.0 + 300));
    }

    #[test]
    fn test_queue_display_rebases_on_backward_pts() {
        let (sink, mut display) = QueueSink::new(4);
        sink.present(nv12(2, 2), MediaTime(6000)).unwrap();

        let t = Instant::now();
        assert_eq!(display.take_due(t).unwrap().pts, MediaTime(6000));

        sink.present(nv12(2, 2), MediaTime(600)).unwrap();
        sink.present(nv12(2, 2), MediaTime(900)).unwrap();
        let t2 = t + Duration::from_millis(50);
        assert_eq!(display.take_due(t2).unwrap().pts, MediaTime(600));
        assert!(display.take_due(t2 + Duration::from_millis(100)).is_none());
        assert_eq!(
            display.take_due(t2 + Duration::from_millis(600)).unwrap().pts,
            MediaTime(900)
        );
    }
}
