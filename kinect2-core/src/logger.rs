//! 驱动层日志出口
//!
//! 驱动内部通过 [`log`] 上报分级消息，进程内只有一个全局 sink。
//! 默认 sink 转发给 `tracing`；调用 [`set_global_logger`] 会替换之前的 sink，
//! 旧 sink 不会收到任何通知。

use std::fmt;
use std::sync::{Arc, RwLock};

/// 日志级别，数值越大越详细
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    None = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
    Debug = 4,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// 日志接收端
pub trait LogSink: Send + Sync {
    /// 该 sink 接收的最详细级别
    fn level(&self) -> LogLevel;

    fn log(&self, level: LogLevel, message: &str);
}

/// 默认 sink：转发给 `tracing`
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    level: LogLevel,
}

impl TracingSink {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl LogSink for TracingSink {
    fn level(&self) -> LogLevel {
        self.level
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::None => {}
            LogLevel::Error => tracing::error!(target: "kinect2::driver", "{}", message),
            LogLevel::Warning => tracing::warn!(target: "kinect2::driver", "{}", message),
            LogLevel::Info => tracing::info!(target: "kinect2::driver", "{}", message),
            LogLevel::Debug => tracing::debug!(target: "kinect2::driver", "{}", message),
        }
    }
}

/// 用闭包实现的 sink
pub struct CallbackSink<F> {
    level: LogLevel,
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    pub fn new(level: LogLevel, callback: F) -> Self {
        Self { level, callback }
    }
}

impl<F> LogSink for CallbackSink<F>
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn level(&self) -> LogLevel {
        self.level
    }

    fn log(&self, level: LogLevel, message: &str) {
        (self.callback)(level, message)
    }
}

impl<F> fmt::Debug for CallbackSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

static GLOBAL_LOGGER: RwLock<Option<Arc<dyn LogSink>>> = RwLock::new(None);

/// 安装全局 sink，替换之前的任何 sink
pub fn set_global_logger<S>(sink: S)
where
    S: LogSink + 'static,
{
    let mut slot = GLOBAL_LOGGER.write().unwrap_or_else(|e| e.into_inner());
    *slot = Some(Arc::new(sink));
}

/// 当前生效的 sink；未安装时返回默认的 [`TracingSink`]
pub fn global_logger() -> Arc<dyn LogSink> {
    let slot = GLOBAL_LOGGER.read().unwrap_or_else(|e| e.into_inner());
    match slot.as_ref() {
        Some(sink) => Arc::clone(sink),
        None => Arc::new(TracingSink::default()),
    }
}

/// 驱动侧上报一条日志，超过 sink 级别的消息被丢弃
pub fn log(level: LogLevel, message: &str) {
    if level == LogLevel::None {
        return;
    }
    let sink = global_logger();
    if level <= sink.level() {
        sink.log(level, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn last_installed_sink_wins_and_filters_by_level() {
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let sink = first.clone();
        set_global_logger(CallbackSink::new(LogLevel::Debug, move |lvl, msg| {
            sink.lock().unwrap().push((lvl, msg.to_string()));
        }));
        log(LogLevel::Info, "to first");

        let sink = second.clone();
        set_global_logger(CallbackSink::new(LogLevel::Warning, move |lvl, msg| {
            sink.lock().unwrap().push((lvl, msg.to_string()));
        }));
        log(LogLevel::Error, "to second");
        log(LogLevel::Info, "filtered");
        log(LogLevel::None, "never");

        assert_eq!(*first.lock().unwrap(), vec![(LogLevel::Info, "to first".to_string())]);
        assert_eq!(*second.lock().unwrap(), vec![(LogLevel::Error, "to second".to_string())]);
    }

    #[test]
    fn levels_are_ordered_by_verbosity() {
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert_eq!(LogLevel::Debug as u8, 4);
    }
}
