use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kinect2_core::error::{CameraError, Result};
use kinect2_core::frame::{Frame, FrameType, RawFrame};
use kinect2_core::traits::FrameSink;

type Handler = dyn Fn(FrameType, Frame) -> anyhow::Result<()> + Send + Sync;

/// listener 的累计统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub delivered: u64,
    pub faults: u64,
}

struct Bridge {
    handler: Box<Handler>,
    delivered: AtomicU64,
    faults: AtomicU64,
}

impl Bridge {
    fn fault(&self, frame_type: FrameType, message: String) -> CameraError {
        self.faults.fetch_add(1, Ordering::Relaxed);
        CameraError::Listener {
            frame_type,
            message,
        }
    }
}

impl FrameSink for Bridge {
    fn on_new_frame(&self, frame_type: FrameType, raw: RawFrame) -> Result<()> {
        // 1. 接管缓冲。描述符不合法时 raw 在这里被释放
        let frame = Frame::from_raw(raw).map_err(|e| self.fault(frame_type, e.to_string()))?;
        tracing::trace!(?frame_type, sequence = frame.sequence(), "Delivering frame");

        // 2. 在 capture 线程上同步回调，Frame 的所有权移交给消费者
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(frame_type, frame)));

        // 3. 把消费者的结果翻译回驱动
        match outcome {
            Ok(Ok(())) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                if message.is_empty() {
                    // 空消息视为成功
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                } else {
                    Err(self.fault(frame_type, message))
                }
            }
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(self.fault(frame_type, format!("listener panicked: {}", reason)))
            }
        }
    }
}

/// 帧回调桥
///
/// 把驱动在 capture 线程上交付的原始帧包装成 [`Frame`]，同步调用消费者的闭包。
/// 回调返回错误时，错误经 [`FrameSink::on_new_frame`] 传回驱动；
/// 帧在此之前已经移交给回调，不会泄漏，也不会被驱动再次访问。
///
/// 克隆得到的是同一个桥 (共享统计)。
#[derive(Clone)]
pub struct FrameListener {
    bridge: Arc<Bridge>,
}

impl FrameListener {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(FrameType, Frame) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            bridge: Arc::new(Bridge {
                handler: Box::new(handler),
                delivered: AtomicU64::new(0),
                faults: AtomicU64::new(0),
            }),
        }
    }

    /// 携带上下文的回调，上下文的所有权归 listener
    pub fn with_context<C, F>(context: C, handler: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&C, FrameType, Frame) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(move |frame_type, frame| handler(&context, frame_type, frame))
    }

    /// 不会失败的回调
    pub fn sink<F>(handler: F) -> Self
    where
        F: Fn(FrameType, Frame) + Send + Sync + 'static,
    {
        Self::new(move |frame_type, frame| {
            handler(frame_type, frame);
            Ok(())
        })
    }

    /// 以驱动的身份交付一帧 (测试与自定义驱动使用)
    pub fn deliver(&self, frame_type: FrameType, raw: RawFrame) -> Result<()> {
        self.bridge.on_new_frame(frame_type, raw)
    }

    pub fn stats(&self) -> ListenerStats {
        ListenerStats {
            delivered: self.bridge.delivered.load(Ordering::Relaxed),
            faults: self.bridge.faults.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn as_sink(&self) -> Arc<dyn FrameSink> {
        self.bridge.clone()
    }
}

impl fmt::Debug for FrameListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameListener")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
