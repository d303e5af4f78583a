use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use kinect2_core::error::{CameraError, Result};
use kinect2_core::frame::{Frame, FrameType};

use crate::listener::FrameListener;

/// 每种类型至多一帧的集合
#[derive(Debug, Default)]
pub struct FrameMap {
    color: Option<Frame>,
    ir: Option<Frame>,
    depth: Option<Frame>,
}

impl FrameMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, frame_type: FrameType) -> &mut Option<Frame> {
        match frame_type {
            FrameType::Color => &mut self.color,
            FrameType::Ir => &mut self.ir,
            FrameType::Depth => &mut self.depth,
        }
    }

    /// 放入一帧，返回被替换的旧帧
    pub fn insert(&mut self, frame_type: FrameType, frame: Frame) -> Option<Frame> {
        self.slot(frame_type).replace(frame)
    }

    pub fn get(&self, frame_type: FrameType) -> Option<&Frame> {
        match frame_type {
            FrameType::Color => self.color.as_ref(),
            FrameType::Ir => self.ir.as_ref(),
            FrameType::Depth => self.depth.as_ref(),
        }
    }

    pub fn take(&mut self, frame_type: FrameType) -> Option<Frame> {
        self.slot(frame_type).take()
    }

    pub fn contains(&self, frame_type: FrameType) -> bool {
        self.get(frame_type).is_some()
    }

    pub fn len(&self) -> usize {
        FrameType::ALL.iter().filter(|t| self.contains(**t)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 取出某类型的帧，不存在时返回 `InvalidFrame`
    pub fn expect_frame(&mut self, frame_type: FrameType) -> Result<Frame> {
        self.take(frame_type)
            .ok_or_else(|| CameraError::InvalidFrame(format!("no {:?} frame in set", frame_type)))
    }
}

struct Collector {
    types: Vec<FrameType>,
    pending: Mutex<FrameMap>,
    tx: Sender<FrameMap>,
    // 持有一个 Receiver，队列满时用它丢弃最旧的一组
    oldest: Receiver<FrameMap>,
    dropped_sets: AtomicU64,
}

impl Collector {
    fn collect(&self, frame_type: FrameType, frame: Frame) {
        if !self.types.contains(&frame_type) {
            return;
        }

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.insert(frame_type, frame);
        if !self.types.iter().all(|t| pending.contains(*t)) {
            return;
        }

        let mut set = std::mem::take(&mut *pending);
        loop {
            match self.tx.try_send(set) {
                Ok(()) => break,
                Err(TrySendError::Full(rejected)) => {
                    if self.oldest.try_recv().is_ok() {
                        self.dropped_sets.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!("Frame queue full, dropped the oldest set");
                    }
                    set = rejected;
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    }
}

/// 缓冲式 listener：凑齐一组帧后放入有界队列
///
/// 队列满时丢弃最旧的一组 (drop-oldest)，capture 线程永不阻塞。
/// 通过 [`MultiFrameListener::listener`] 拿到桥，挂到设备的一个或两个槽位上。
pub struct MultiFrameListener {
    collector: Arc<Collector>,
    rx: Receiver<FrameMap>,
    listener: FrameListener,
}

impl MultiFrameListener {
    /// 默认队列深度
    pub const DEFAULT_CAPACITY: usize = 4;

    /// `types` 为空时等同于全部三种类型
    pub fn new(types: &[FrameType]) -> Self {
        Self::with_capacity(types, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(types: &[FrameType], capacity: usize) -> Self {
        let mut types = if types.is_empty() {
            FrameType::ALL.to_vec()
        } else {
            types.to_vec()
        };
        types.sort();
        types.dedup();

        let (tx, rx) = bounded(capacity.max(1));
        let collector = Arc::new(Collector {
            types,
            pending: Mutex::new(FrameMap::new()),
            tx,
            oldest: rx.clone(),
            dropped_sets: AtomicU64::new(0),
        });

        let sink = Arc::clone(&collector);
        let listener = FrameListener::sink(move |frame_type, frame| sink.collect(frame_type, frame));

        Self {
            collector,
            rx,
            listener,
        }
    }

    /// 挂到设备上的桥 (克隆共享同一个队列)
    pub fn listener(&self) -> FrameListener {
        self.listener.clone()
    }

    /// 阻塞直到有一组完整的帧
    pub fn get_frames(&self) -> Result<FrameMap> {
        // collector 持有 Sender，recv 不会因断开而返回
        self.rx
            .recv()
            .map_err(|_| CameraError::OperationFailed("get_frames"))
    }

    pub fn get_frames_with_timeout(&self, timeout: Duration) -> Result<FrameMap> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => CameraError::Timeout,
            RecvTimeoutError::Disconnected => CameraError::OperationFailed("get_frames"),
        })
    }

    pub fn try_get_frames(&self) -> Option<FrameMap> {
        self.rx.try_recv().ok()
    }

    /// 因队列满被丢弃的帧组数量
    pub fn dropped_sets(&self) -> u64 {
        self.collector.dropped_sets.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for MultiFrameListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiFrameListener")
            .field("types", &self.collector.types)
            .field("queued", &self.rx.len())
            .field("dropped_sets", &self.dropped_sets())
            .finish()
    }
}
