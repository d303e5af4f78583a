use std::time::{Duration, Instant};

/// 硬件时间戳的分辨率：每毫秒 8 个 tick
pub const TICKS_PER_MS: u32 = 8;

/// 30Hz 时相邻两帧的 tick 间隔 (约 33.3ms)
pub const TICKS_PER_FRAME_30HZ: u32 = 266;

/// tick (1/8 ms) 转换为 Duration
pub fn ticks_to_duration(ticks: u32) -> Duration {
    Duration::from_micros(u64::from(ticks) * 125)
}

/// Duration 转换为 tick，超出 u32 时回绕 (与硬件计数器一致)
pub fn duration_to_ticks(d: Duration) -> u32 {
    (d.as_micros() / 125) as u32
}

/// 模拟设备侧的时间戳计数器
///
/// 以创建时刻为零点，按 1/8 ms 计数，32 位回绕。
#[derive(Debug, Clone, Copy)]
pub struct TickClock {
    origin: Instant,
}

impl TickClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// 当前的 tick 值
    pub fn now(&self) -> u32 {
        self.at(Instant::now())
    }

    /// 某个时刻对应的 tick 值，早于零点时为 0
    pub fn at(&self, t: Instant) -> u32 {
        duration_to_ticks(t.saturating_duration_since(self.origin))
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_eighth_milliseconds() {
        assert_eq!(ticks_to_duration(8), Duration::from_millis(1));
        assert_eq!(duration_to_ticks(Duration::from_millis(250)), 2000);
        assert_eq!(ticks_to_duration(TICKS_PER_FRAME_30HZ).as_micros(), 33_250);
    }

    #[test]
    fn clock_is_monotonic() {
        let clock = TickClock::start();
        let later = Instant::now() + Duration::from_millis(10);
        assert!(clock.at(later) >= 80);
        assert!(clock.now() <= clock.at(later));
    }
}
