//! 软件模拟的 Kinect v2 驱动
//!
//! 实现 `kinect2-core` 的 [`Driver`] / `NativeDevice` 接口：
//! 像素缓冲在 C 堆上分配，由 capture 线程交给 listener，
//! 让上层在没有硬件的环境下也能完整走通 "枚举 -> 打开 -> 采集 -> 配准"。

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod alloc;
mod device;
mod stream;

use std::time::Duration;

use kinect2_core::calibration::{CameraCalibration, ColorCameraParams, Extrinsics, IrCameraParams};
use kinect2_core::config::Config;
use kinect2_core::logger::{self, LogLevel};
use kinect2_core::pipeline::{CpuBackend, PacketPipeline, ProcessingBackend};
use kinect2_core::traits::{DeviceSelector, Driver, NativeDevice};

pub use alloc::{AllocationStats, NativeAllocator};
pub use device::SimDevice;

/// 一台模拟设备的描述
#[derive(Debug, Clone, PartialEq)]
pub struct SimDeviceSpec {
    pub serial: String,
    pub firmware: String,
    /// `None` 模拟没有上报标定数据的设备
    pub calibration: Option<CameraCalibration>,
    /// 两帧之间的间隔
    pub frame_interval: Duration,
}

impl SimDeviceSpec {
    /// 全分辨率 (512x424 深度, 1920x1080 彩色)，30Hz
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            firmware: "4.0.3911.0".to_string(),
            calibration: Some(CameraCalibration::default()),
            frame_interval: Duration::from_millis(33),
        }
    }

    /// 缩小的传感器 (32x24 深度, 64x48 彩色)，用于测试
    pub fn tiny(serial: impl Into<String>) -> Self {
        let calibration = CameraCalibration {
            ir: IrCameraParams {
                fx: 23.0,
                fy: 23.0,
                cx: 16.0,
                cy: 12.0,
                width: 32,
                height: 24,
                ..IrCameraParams::default()
            },
            color: ColorCameraParams {
                fx: 36.0,
                fy: 36.0,
                cx: 31.5,
                cy: 23.5,
                width: 64,
                height: 48,
            },
            extrinsics: Extrinsics::default(),
        };
        Self {
            calibration: Some(calibration),
            frame_interval: Duration::from_millis(2),
            ..Self::new(serial)
        }
    }

    pub fn with_calibration(mut self, calibration: Option<CameraCalibration>) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }
}

/// 模拟驱动
///
/// `attached` 是 "插在总线上" 的设备，`enumerate_devices` 之后才对外可见。
#[derive(Debug)]
pub struct SimDriver {
    attached: Vec<SimDeviceSpec>,
    visible: Vec<SimDeviceSpec>,
    allocator: NativeAllocator,
    backends_supported: bool,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    /// 一台全分辨率设备
    pub fn new() -> Self {
        Self::with_devices(vec![SimDeviceSpec::new("SIM000000000001")])
    }

    /// 没有任何设备
    pub fn empty() -> Self {
        Self::with_devices(Vec::new())
    }

    pub fn with_devices(devices: Vec<SimDeviceSpec>) -> Self {
        Self {
            attached: devices,
            visible: Vec::new(),
            allocator: NativeAllocator::new(),
            backends_supported: true,
        }
    }

    /// 让 `create_backend` 总是失败 (模拟 GPU 初始化失败)
    pub fn without_backends(mut self) -> Self {
        self.backends_supported = false;
        self
    }

    /// 所有设备共用的缓冲分配器，可用于检查泄漏
    pub fn allocator(&self) -> NativeAllocator {
        self.allocator.clone()
    }
}

impl Driver for SimDriver {
    fn enumerate_devices(&mut self) -> usize {
        self.visible = self.attached.clone();
        logger::log(
            LogLevel::Info,
            &format!("found {} simulated device(s)", self.visible.len()),
        );
        self.visible.len()
    }

    fn device_serial_number(&self, index: usize) -> Option<String> {
        self.visible.get(index).map(|spec| spec.serial.clone())
    }

    fn create_backend(&self, pipeline: PacketPipeline) -> Option<Box<dyn ProcessingBackend>> {
        if !self.backends_supported {
            logger::log(
                LogLevel::Error,
                &format!("failed to initialize {} pipeline", pipeline),
            );
            return None;
        }
        Some(Box::new(SoftwareBackend::new(pipeline)))
    }

    fn open(
        &mut self,
        selector: DeviceSelector<'_>,
        backend: Box<dyn ProcessingBackend>,
    ) -> Option<Box<dyn NativeDevice>> {
        let spec = match selector {
            DeviceSelector::Index(index) => self.visible.get(index),
            DeviceSelector::Serial(serial) => self.visible.iter().find(|s| s.serial == serial),
        };

        let Some(spec) = spec.cloned() else {
            logger::log(LogLevel::Warning, &format!("no device matches {:?}", selector));
            return None;
        };

        Some(Box::new(SimDevice::new(spec, backend, self.allocator.clone())))
    }
}

/// 加速流水线的软件替身：按 CPU 实现处理，但报告请求的类型
#[derive(Debug)]
struct SoftwareBackend {
    kind: PacketPipeline,
    cpu: CpuBackend,
}

impl SoftwareBackend {
    fn new(kind: PacketPipeline) -> Self {
        Self {
            kind,
            cpu: CpuBackend::new(),
        }
    }
}

impl ProcessingBackend for SoftwareBackend {
    fn kind(&self) -> PacketPipeline {
        self.kind
    }

    fn process_depth(&mut self, depth: &mut [f32], width: usize, height: usize, config: &Config) {
        self.cpu.process_depth(depth, width, height, config)
    }
}
