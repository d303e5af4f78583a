use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// 数据流遥测快照
///
/// 由 capture 线程累加，调用方随时读取，不随帧下发。
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamTelemetry {
    /// 成功交付给 listener 的帧数
    pub frames_delivered: u64,

    /// listener 返回错误 (或 panic) 的次数
    pub listener_faults: u64,

    /// 没有 listener 时被直接释放的帧数
    pub dropped_frames: u64,
}

impl fmt::Debug for StreamTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTelemetry")
            .field("delivered", &self.frames_delivered)
            .field("faults", &self.listener_faults)
            .field("dropped", &self.dropped_frames)
            .finish()
    }
}

/// 简单的状态指示灯
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHealthStatus {
    Healthy,
    Warning(HealthIssue),
    Critical(HealthIssue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthIssue {
    /// 消费者回调频繁失败
    ListenerFaults,
    /// 帧在没有消费者的情况下被丢弃
    Unconsumed,
}

impl StreamTelemetry {
    /// 基于计数的粗略健康评估
    pub fn assess_health(&self) -> StreamHealthStatus {
        let total = self.frames_delivered + self.listener_faults;
        if total > 0 && self.listener_faults * 2 > total {
            return StreamHealthStatus::Critical(HealthIssue::ListenerFaults);
        }
        if self.listener_faults > 0 {
            return StreamHealthStatus::Warning(HealthIssue::ListenerFaults);
        }
        if self.dropped_frames > 0 {
            return StreamHealthStatus::Warning(HealthIssue::Unconsumed);
        }
        StreamHealthStatus::Healthy
    }
}

/// 线程安全的计数器组，供驱动实现累加
#[derive(Debug, Default)]
pub struct TelemetryCounters {
    delivered: AtomicU64,
    faults: AtomicU64,
    dropped: AtomicU64,
}

impl TelemetryCounters {
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamTelemetry {
        StreamTelemetry {
            frames_delivered: self.delivered.load(Ordering::Relaxed),
            listener_faults: self.faults.load(Ordering::Relaxed),
            dropped_frames: self.dropped.load(Ordering::Relaxed),
        }
    }
}
