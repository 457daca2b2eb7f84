use crate::core::{normalize_timestamp, MediaTime, TimeBase};
use std::time::{Duration, Instant};

/// 显示时间戳生成器 - 保证交给显示端的时间戳严格递增
///
/// 起点为 0，第一帧也要严格大于 0
#[derive(Debug, Default)]
pub struct PresentationClock {
    last: MediaTime,
}

impl PresentationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把流时间戳换算为显示时间戳
    ///
    /// 不大于上一个值时推进到 `上一个 + 1` 刻度
    pub fn next(&mut self, ts: Option<i64>, time_base: TimeBase) -> MediaTime {
        let seconds = time_base.to_seconds(normalize_timestamp(ts));
        self.clamp(MediaTime::from_seconds(seconds))
    }

    pub fn clamp(&mut self, candidate: MediaTime) -> MediaTime {
        let pts = if candidate <= self.last {
            self.last.next_tick()
        } else {
            candidate
        };
        self.last = pts;
        pts
    }
}

/// 节拍时钟 - 按原始帧率而不是解码速度显示
#[derive(Debug, Default)]
pub struct PacingClock {
    origin: Option<(f64, Instant)>, // (首帧流时间（秒）, 墙钟起点)
}

impl PacingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 计算当前帧需要等待的时长
    ///
    /// 首帧记录起点并返回 0；迟到的帧返回 0（不丢帧）
    pub fn delay_for(&mut self, stream_seconds: f64, now: Instant) -> Duration {
        let (first_stream, wall_start) = *self.origin.get_or_insert((stream_seconds, now));

        let target = stream_seconds - first_stream;
        let actual = now.saturating_duration_since(wall_start).as_secs_f64();

        if target > actual {
            Duration::from_secs_f64(target - actual)
        } else {
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentation_clock_monotonic_clamp() {
        let mut clock = PresentationClock::new();
        let tb = TimeBase::new(1, 1000);

        assert_eq!(clock.next(Some(1000), tb), MediaTime(600));
        // 相同时间戳 → 上一个 + 1
        assert_eq!(clock.next(Some(1000), tb), MediaTime(601));
        // 回退的时间戳 → 上一个 + 1
        assert_eq!(clock.next(Some(500), tb), MediaTime(602));
        // 正常递增
        assert_eq!(clock.next(Some(2000), tb), MediaTime(1200));
    }

    #[test]
    fn test_presentation_clock_unset_timestamp() {
        let mut clock = PresentationClock::new();
        let tb = TimeBase::new(1, 90_000);

        // 未设置按 0 处理，0 不大于起点，推进到 1 刻度
        assert_eq!(clock.next(None, tb), MediaTime(1));
        assert_eq!(clock.next(Some(crate::core::NO_TIMESTAMP), tb), MediaTime(2));
    }

    #[test]
    fn test_presentation_clock_first_frame_not_above_zero() {
        let mut clock = PresentationClock::new();
        assert_eq!(clock.next(Some(0), TimeBase::new(1, 1)), MediaTime(1));

        let mut clock = PresentationClock::new();
        assert_eq!(clock.next(Some(-90_000), TimeBase::new(1, 90_000)), MediaTime(1));
        assert_eq!(clock.next(Some(90_000), TimeBase::new(1, 90_000)), MediaTime(600));
    }

    #[test]
    fn test_pacing_three_frames_one_second_apart() {
        let mut pacing = PacingClock::new();
        let tb = TimeBase::new(1, 1);
        let t = Instant::now();

        // 首帧立即显示
        assert_eq!(pacing.delay_for(tb.to_seconds(0), t), Duration::ZERO);

        // 2s 的帧在 T 时刻需要等待 2s
        assert_eq!(pacing.delay_for(tb.to_seconds(2), t), Duration::from_secs(2));

        // 1s 的帧在 T+0.25s 需要等 0.75s
        let d = pacing.delay_for(tb.to_seconds(1), t + Duration::from_millis(250));
        assert_eq!(d, Duration::from_millis(750));
    }

    #[test]
    fn test_pacing_late_frame_not_delayed() {
        let mut pacing = PacingClock::new();
        let t = Instant::now();

        pacing.delay_for(10.0, t);
        // 11s 的帧在 T+3s 才到，已经迟到
        assert_eq!(pacing.delay_for(11.0, t + Duration::from_secs(3)), Duration::ZERO);
    }
}
