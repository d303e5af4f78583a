use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use kinect2_core::calibration::CameraCalibration;
use kinect2_core::config::Config;
use kinect2_core::frame::{FrameMetadata, FrameType, ListenerSlot, RawFrame};
use kinect2_core::logger::{self, LogLevel};
use kinect2_core::pipeline::ProcessingBackend;
use kinect2_core::telemetry::{StreamTelemetry, TelemetryCounters};
use kinect2_core::time::TickClock;
use kinect2_core::traits::{FrameSink, NativeDevice, Streams};

use crate::alloc::NativeAllocator;
use crate::stream;
use crate::SimDeviceSpec;

type SinkSlot = RwLock<Option<Arc<dyn FrameSink>>>;

/// capture 线程与设备句柄共享的状态
struct Shared {
    running: AtomicBool,
    color_sink: SinkSlot,
    ir_depth_sink: SinkSlot,
    config: RwLock<Config>,
    backend: Mutex<Box<dyn ProcessingBackend>>,
    telemetry: TelemetryCounters,
    allocator: NativeAllocator,
    clock: TickClock,
}

impl Shared {
    fn slot(&self, slot: ListenerSlot) -> &SinkSlot {
        match slot {
            ListenerSlot::Color => &self.color_sink,
            ListenerSlot::IrAndDepth => &self.ir_depth_sink,
        }
    }

    /// 把帧交给当前 listener；没有 listener 时直接释放
    fn deliver(&self, frame_type: FrameType, frame: RawFrame) {
        // 先取出 Arc 再回调，不在持锁期间执行用户代码
        let sink = self
            .slot(frame_type.slot())
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let Some(sink) = sink else {
            self.telemetry.record_dropped();
            return;
        };

        match sink.on_new_frame(frame_type, frame) {
            Ok(()) => self.telemetry.record_delivered(),
            Err(e) => {
                self.telemetry.record_fault();
                tracing::error!(?frame_type, error = %e, "Frame listener reported failure");
                logger::log(LogLevel::Error, &format!("listener failed: {}", e));
            }
        }
    }

    fn config(&self) -> Config {
        *self.config.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// 软件模拟的 Kinect v2 设备
///
/// 每路数据流一个 capture 线程 ("kinect2-color" / "kinect2-depth")，
/// listener 在该线程上被同步调用。
pub struct SimDevice {
    spec: SimDeviceSpec,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    closed: bool,
}

impl SimDevice {
    pub(crate) fn new(
        spec: SimDeviceSpec,
        backend: Box<dyn ProcessingBackend>,
        allocator: NativeAllocator,
    ) -> Self {
        tracing::info!(serial = %spec.serial, pipeline = %backend.kind(), "Simulated device opened");
        Self {
            spec,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                color_sink: RwLock::new(None),
                ir_depth_sink: RwLock::new(None),
                config: RwLock::new(Config::default()),
                backend: Mutex::new(backend),
                telemetry: TelemetryCounters::default(),
                allocator,
                clock: TickClock::start(),
            }),
            workers: Vec::new(),
            closed: false,
        }
    }

    fn spawn(&mut self, name: &str, body: impl FnOnce() + Send + 'static) -> bool {
        match thread::Builder::new().name(name.to_string()).spawn(body) {
            Ok(handle) => {
                self.workers.push(handle);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to spawn capture thread {}", name);
                false
            }
        }
    }

    fn join_workers(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Capture thread panicked");
            }
        }
    }
}

impl NativeDevice for SimDevice {
    fn serial_number(&self) -> String {
        self.spec.serial.clone()
    }

    fn firmware_version(&self) -> String {
        self.spec.firmware.clone()
    }

    fn start(&mut self) -> bool {
        self.start_streams(Streams::ALL)
    }

    fn start_streams(&mut self, streams: Streams) -> bool {
        if self.closed || streams.is_empty() {
            return false;
        }
        if self.shared.running.swap(true, Ordering::SeqCst) {
            // 已经在运行
            return false;
        }

        let calibration = self.spec.calibration.unwrap_or_default();
        let interval = self.spec.frame_interval;
        let mut ok = true;

        if streams.contains(Streams::COLOR) {
            let shared = Arc::clone(&self.shared);
            let (w, h) = (calibration.color.width, calibration.color.height);
            ok &= self.spawn("kinect2-color", move || color_loop(shared, w, h, interval));
        }
        if streams.contains(Streams::DEPTH) {
            let shared = Arc::clone(&self.shared);
            let (w, h) = (calibration.ir.width, calibration.ir.height);
            ok &= self.spawn("kinect2-depth", move || depth_loop(shared, w, h, interval));
        }

        if !ok {
            self.shared.running.store(false, Ordering::SeqCst);
            self.join_workers();
            return false;
        }

        tracing::info!(serial = %self.spec.serial, ?streams, "Streams started");
        true
    }

    fn stop(&mut self) -> bool {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.join_workers();
        tracing::info!(serial = %self.spec.serial, "Streams stopped");
        true
    }

    fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        if self.shared.running.load(Ordering::SeqCst) {
            self.stop();
        }
        self.set_frame_listener(ListenerSlot::Color, None);
        self.set_frame_listener(ListenerSlot::IrAndDepth, None);
        self.closed = true;
        tracing::info!(serial = %self.spec.serial, "Simulated device closed");
        true
    }

    fn set_frame_listener(&mut self, slot: ListenerSlot, sink: Option<Arc<dyn FrameSink>>) {
        *self
            .shared
            .slot(slot)
            .write()
            .unwrap_or_else(|e| e.into_inner()) = sink;
    }

    fn set_config(&mut self, config: &Config) {
        *self.shared.config.write().unwrap_or_else(|e| e.into_inner()) = *config;
    }

    fn calibration(&self) -> Option<CameraCalibration> {
        self.spec.calibration
    }

    fn telemetry(&self) -> StreamTelemetry {
        self.shared.telemetry.snapshot()
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        if !self.closed {
            self.close();
        }
    }
}

impl std::fmt::Debug for SimDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDevice")
            .field("serial", &self.spec.serial)
            .field("running", &self.shared.running.load(Ordering::Relaxed))
            .field("closed", &self.closed)
            .finish()
    }
}

fn metadata(shared: &Shared, sequence: u32) -> FrameMetadata {
    FrameMetadata {
        timestamp: shared.clock.now(),
        sequence,
        exposure: 10.0,
        gain: 1.0,
        gamma: 1.0,
        status: 0,
    }
}

fn color_loop(shared: Arc<Shared>, width: usize, height: usize, interval: std::time::Duration) {
    let mut sequence = 0u32;
    while shared.running.load(Ordering::SeqCst) {
        let pixels = stream::color_pixels(width, height, sequence);
        let descriptor = stream::color_descriptor(width, height, metadata(&shared, sequence));

        match stream::native_frame(&shared.allocator, descriptor, &pixels) {
            Some(frame) => shared.deliver(FrameType::Color, frame),
            None => tracing::warn!("Color buffer allocation failed, frame skipped"),
        }
        tracing::trace!(sequence, "Color frame produced");

        sequence = sequence.wrapping_add(1);
        thread::sleep(interval);
    }
}

fn depth_loop(shared: Arc<Shared>, width: usize, height: usize, interval: std::time::Duration) {
    let mut sequence = 0u32;
    while shared.running.load(Ordering::SeqCst) {
        let mut depth = stream::depth_values(width, height);
        let ir = stream::ir_values(&depth);

        let config = shared.config();
        shared
            .backend
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .process_depth(&mut depth, width, height, &config);

        // 同一时刻先交付 IR，再交付深度
        let meta = metadata(&shared, sequence);
        for (frame_type, values) in [(FrameType::Ir, &ir), (FrameType::Depth, &depth)] {
            let descriptor = stream::float_descriptor(width, height, meta);
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
            match stream::native_frame(&shared.allocator, descriptor, &bytes) {
                Some(frame) => shared.deliver(frame_type, frame),
                None => tracing::warn!(?frame_type, "Buffer allocation failed, frame skipped"),
            }
        }
        tracing::trace!(sequence, "IR/depth frames produced");

        sequence = sequence.wrapping_add(1);
        thread::sleep(interval);
    }
}
