use crate::core::{
    normalize_timestamp, PacingClock, PipelineError, PipelineState, PipelineStats,
    PresentationClock, Result,
};
use crate::player::converter::PixelConverter;
use crate::player::decoder::{DecodedFrame, FrameDecoder};
use crate::player::demuxer_source::PacketSource;
use crate::player::sink::PresentationSink;
use ffmpeg_next::format::Pixel;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 控速等待期间检查停止标志的间隔
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 解码线程与外部共享的控制块：停止标志、统计、状态
#[derive(Clone)]
pub struct PipelineControl {
    stop: Arc<AtomicBool>,
    stats: Arc<Mutex<PipelineStats>>,
    state: Arc<RwLock<PipelineState>>,
}

impl PipelineControl {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(PipelineStats::default())),
            state: Arc::new(RwLock::new(PipelineState::Idle)),
        }
    }

    /// 请求停止，可以在任意线程调用
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.lock().clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state.read().clone()
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.write() = state;
    }

    fn update_stats(&self, f: impl FnOnce(&mut PipelineStats)) {
        f(&mut self.stats.lock());
    }

    /// 等待指定时长，期间收到停止请求则提前返回 false
    fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stop_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
        }
    }
}

impl Default for PipelineControl {
    fn default() -> Self {
        Self::new()
    }
}

/// 循环退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    EndOfStream,
    Stopped,
}

/// 解码显示管线：读包 → 解码 → 转换 → 控速 → 显示
pub struct Pipeline<S, D, C> {
    // 字段按声明顺序释放：转换器 → 解码器 → 数据源（与获取顺序相反）
    converter: C,
    decoder: D,
    source: S,
    sink: Arc<dyn PresentationSink>,
    presentation: PresentationClock,
    pacing: Option<PacingClock>,
    frame_format: Option<(Pixel, u32, u32)>,
}

impl<S, D, C> Pipeline<S, D, C>
where
    S: PacketSource,
    D: FrameDecoder<Packet = S::Packet>,
    C: PixelConverter<Frame = D::Frame>,
{
    pub fn new(source: S, decoder: D, converter: C, sink: Arc<dyn PresentationSink>) -> Self {
        if converter.target() != sink.preferred_layout() {
            warn!(
                "转换目标 {} 与显示端需要的 {} 不一致",
                converter.target().name(),
                sink.preferred_layout().name()
            );
        }

        Self {
            converter,
            decoder,
            source,
            sink,
            presentation: PresentationClock::new(),
            pacing: None,
            frame_format: None,
        }
    }

    /// 是否按时间戳控速
    pub fn with_pacing(mut self, enabled: bool) -> Self {
        self.pacing = enabled.then(PacingClock::new);
        self
    }

    /// 运行到流结束或收到停止请求
    pub fn run(&mut self, control: &PipelineControl) -> PipelineStats {
        info!(
            "{} 🎬 解码线程启动: {}（{}，控速: {}）",
            log_ctx(),
            self.source.description(),
            self.decoder.info(),
            if self.pacing.is_some() { "开" } else { "关" }
        );
        control.set_state(PipelineState::Playing);

        let mut exit = self.read_loop(control);

        if exit == LoopExit::EndOfStream {
            match self.decoder.flush() {
                Ok(frames) => {
                    if !self.present_frames(frames, control) {
                        exit = LoopExit::Stopped;
                    }
                }
                Err(e) => warn!("{} 刷新解码器失败: {}", log_ctx(), e),
            }
        }

        control.set_state(match exit {
            LoopExit::EndOfStream => PipelineState::Finished,
            LoopExit::Stopped => PipelineState::Stopped,
        });

        let stats = control.stats();
        info!(
            "{} 🛑 解码线程退出（读包 {}，视频包 {}，解码 {} 帧，显示 {}，丢弃 {}，转换失败 {}）",
            log_ctx(),
            stats.packets_read,
            stats.video_packets,
            stats.frames_decoded,
            stats.frames_presented,
            stats.frames_dropped,
            stats.conversion_failures
        );
        stats
    }

    fn read_loop(&mut self, control: &PipelineControl) -> LoopExit {
        let video_index = self.source.stream_info().video_stream_index;

        loop {
            if control.is_stop_requested() {
                info!("{} ⏹ 收到停止请求", log_ctx());
                return LoopExit::Stopped;
            }

            let packet = match self.source.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    info!("{} 📄 到达流末尾", log_ctx());
                    return LoopExit::EndOfStream;
                }
                Err(e) => {
                    // 读包失败按流结束处理
                    warn!("{} 读取数据包失败，结束播放: {}", log_ctx(), e);
                    return LoopExit::EndOfStream;
                }
            };

            control.update_stats(|s| s.packets_read += 1);
            if packet.stream_index != video_index {
                continue;
            }
            control.update_stats(|s| s.video_packets += 1);

            let frames = match self.decoder.decode(&packet.payload) {
                Ok(frames) => frames,
                Err(e) => {
                    warn!("{} 解码错误（已跳过）: {}", log_ctx(), e);
                    control.update_stats(|s| s.decode_errors += 1);
                    continue;
                }
            };
            drop(packet);

            if !self.present_frames(frames, control) {
                return LoopExit::Stopped;
            }
        }
    }

    /// 逐帧处理，收到停止请求时返回 false
    fn present_frames(&mut self, frames: Vec<D::Frame>, control: &PipelineControl) -> bool {
        for frame in frames {
            if control.is_stop_requested() {
                return false;
            }
            control.update_stats(|s| s.frames_decoded += 1);
            if !self.present_frame(frame, control) {
                return false;
            }
        }
        true
    }

    fn present_frame(&mut self, frame: D::Frame, control: &PipelineControl) -> bool {
        let timestamp = frame.presentation_timestamp();
        let format = (frame.pixel_format(), frame.frame_width(), frame.frame_height());
        if self.frame_format != Some(format) {
            info!(
                "{} 🎞 解码输出: {:?} {}x{}",
                log_ctx(),
                format.0,
                format.1,
                format.2
            );
            self.frame_format = Some(format);
        }

        let buffer = match self.converter.convert(&frame) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("{} {}，跳过该帧", log_ctx(), e);
                control.update_stats(|s| s.conversion_failures += 1);
                return true;
            }
        };
        drop(frame);

        let time_base = self.source.stream_info().time_base;
        let pts = self.presentation.next(timestamp, time_base);

        if let Some(pacing) = self.pacing.as_mut() {
            let stream_seconds = time_base.to_seconds(normalize_timestamp(timestamp));
            let delay = pacing.delay_for(stream_seconds, Instant::now());
            if !delay.is_zero() && !control.wait(delay) {
                return false;
            }
        }

        // 背压由显示端决定：未就绪直接丢帧
        if !self.sink.is_ready_for_more_data() {
            debug!("{} 显示端未就绪，丢弃 pts {}", log_ctx(), pts);
            control.update_stats(|s| s.frames_dropped += 1);
            return true;
        }

        match self.sink.present(buffer, pts) {
            Ok(true) => control.update_stats(|s| {
                s.frames_presented += 1;
                s.last_pts = Some(pts);
            }),
            Ok(false) => control.update_stats(|s| s.frames_dropped += 1),
            Err(e) if e.is_per_frame() => {
                warn!("{} {}，跳过该帧", log_ctx(), e);
                control.update_stats(|s| s.conversion_failures += 1);
            }
            Err(e) => warn!("{} 显示端出错，跳过该帧: {}", log_ctx(), e),
        }
        true
    }
}

/// 管线线程句柄
///
/// 在后台线程里完成打开和解码循环；stop() 幂等，drop 时自动停止
pub struct PipelineHandle {
    control: PipelineControl,
    sink: Arc<dyn PresentationSink>,
    worker: Option<JoinHandle<Result<PipelineStats>>>,
}

impl PipelineHandle {
    /// 启动管线线程
    ///
    /// `setup` 在后台线程中执行（打开网络流可能阻塞），失败即为该管线的最终结果
    pub fn spawn<F, S, D, C>(sink: Arc<dyn PresentationSink>, setup: F) -> Self
    where
        F: FnOnce() -> Result<Pipeline<S, D, C>> + Send + 'static,
        S: PacketSource + 'static,
        D: FrameDecoder<Packet = S::Packet> + 'static,
        C: PixelConverter<Frame = D::Frame> + 'static,
    {
        let control = PipelineControl::new();
        let worker_control = control.clone();

        let worker = thread::spawn(move || {
            let control = worker_control;
            control.set_state(PipelineState::Opening);

            let mut pipeline = match setup() {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    error!("{} ❌ 管线启动失败: {}", log_ctx(), e);
                    control.set_state(PipelineState::Failed(e.to_string()));
                    return Err(e);
                }
            };

            if control.is_stop_requested() {
                info!("{} ⏹ 启动期间收到停止请求，直接释放资源", log_ctx());
                drop(pipeline);
                control.set_state(PipelineState::Stopped);
                return Ok(control.stats());
            }

            let stats = pipeline.run(&control);
            drop(pipeline);
            Ok(stats)
        });

        Self {
            control,
            sink,
            worker: Some(worker),
        }
    }

    pub fn control(&self) -> &PipelineControl {
        &self.control
    }

    pub fn state(&self) -> PipelineState {
        self.control.state()
    }

    pub fn stats(&self) -> PipelineStats {
        self.control.stats()
    }

    /// 后台线程是否已经结束
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |worker| worker.is_finished())
    }

    /// 停止管线并等待线程退出
    ///
    /// 第一次调用返回线程结果，之后的调用返回 None
    pub fn stop(&mut self) -> Option<Result<PipelineStats>> {
        self.control.request_stop();
        let result = self.wait_worker();
        self.sink.flush();
        result
    }

    /// 不请求停止，等待管线自然结束
    pub fn join(mut self) -> Option<Result<PipelineStats>> {
        self.wait_worker()
    }

    fn wait_worker(&mut self) -> Option<Result<PipelineStats>> {
        let worker = self.worker.take()?;

        if worker.thread().id() == thread::current().id() {
            // 在解码线程内部调用，只能设置停止标志
            warn!("{} ⚠ 在解码线程内调用 stop()，不等待线程退出", log_ctx());
            return None;
        }

        info!("{} 🛑 等待解码线程退出", log_ctx());
        Some(worker.join().unwrap_or_else(|_| {
            Err(PipelineError::Worker("解码线程 panic".to_string()))
        }))
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            warn!("{} ⚠ PipelineHandle 被 drop，但未调用 stop()，正在停止", log_ctx());
            self.stop();
        }
    }
}
