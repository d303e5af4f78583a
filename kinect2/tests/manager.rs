use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use kinect2::prelude::*;
use kinect2::pipeline::{CpuBackend, ProcessingBackend};
use kinect2::telemetry::StreamTelemetry;
use kinect2_simulation::{SimDeviceSpec, SimDriver};

/// 所有操作都失败的驱动，用于检查错误映射
struct StubbornDriver {
    opened: Arc<AtomicUsize>,
}

struct StubbornDevice;

impl Driver for StubbornDriver {
    fn enumerate_devices(&mut self) -> usize {
        1
    }

    fn device_serial_number(&self, index: usize) -> Option<String> {
        (index == 0).then(|| "STUBBORN".to_string())
    }

    fn create_backend(&self, _: PacketPipeline) -> Option<Box<dyn ProcessingBackend>> {
        Some(Box::new(CpuBackend::new()))
    }

    fn open(
        &mut self,
        _: DeviceSelector<'_>,
        _: Box<dyn ProcessingBackend>,
    ) -> Option<Box<dyn NativeDevice>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(StubbornDevice))
    }
}

impl NativeDevice for StubbornDevice {
    fn serial_number(&self) -> String {
        "STUBBORN".to_string()
    }

    fn firmware_version(&self) -> String {
        "0.0".to_string()
    }

    fn start(&mut self) -> bool {
        false
    }

    fn start_streams(&mut self, _: Streams) -> bool {
        false
    }

    fn stop(&mut self) -> bool {
        false
    }

    fn close(&mut self) -> bool {
        false
    }

    fn set_frame_listener(&mut self, _: ListenerSlot, _: Option<Arc<dyn FrameSink>>) {}

    fn set_config(&mut self, _: &Config) {}

    fn calibration(&self) -> Option<CameraCalibration> {
        None
    }

    fn telemetry(&self) -> StreamTelemetry {
        StreamTelemetry::default()
    }
}

#[test]
fn no_hardware_means_device_unavailable() {
    let mut manager = DeviceManager::with_driver(SimDriver::empty());
    assert_eq!(manager.enumerate_devices(), 0);

    assert!(matches!(
        manager.open_default_device(),
        Err(CameraError::DeviceUnavailable(_))
    ));
    assert!(matches!(
        manager.open_device_by_serial("nope"),
        Err(CameraError::DeviceUnavailable(_))
    ));
    assert!(matches!(
        manager.get_default_device_serial_number(),
        Err(CameraError::DeviceNotFound { index: 0, count: 0 })
    ));
}

#[test]
fn manager_reports_its_driver_source() -> Result<()> {
    let manager = DeviceManager::with_driver(SimDriver::empty());
    assert_eq!(manager.backend(), BackendType::External);

    #[cfg(feature = "simulation")]
    {
        let mut manager = DeviceManager::new()?;
        assert_eq!(manager.backend(), BackendType::Simulation);
        assert_eq!(manager.enumerate_devices(), 1);
    }
    Ok(())
}

#[test]
fn serial_lookup_and_open_by_serial() -> Result<()> {
    let mut manager = DeviceManager::with_driver(SimDriver::with_devices(vec![
        SimDeviceSpec::tiny("FIRST"),
        SimDeviceSpec::tiny("SECOND"),
    ]));

    // 未枚举时自动枚举
    assert_eq!(manager.get_device_serial_number(1)?, "SECOND");
    assert!(matches!(
        manager.get_device_serial_number(2),
        Err(CameraError::DeviceNotFound { index: 2, count: 2 })
    ));

    let device = manager.open_device_by_serial("SECOND")?;
    assert_eq!(device.serial_number(), "SECOND");
    assert!(!device.firmware_version().is_empty());

    let device = manager.open_device_by_id(0)?;
    assert_eq!(device.serial_number(), "FIRST");
    Ok(())
}

#[test]
fn default_serial_lookup_does_not_open_the_device() -> Result<()> {
    let opened = Arc::new(AtomicUsize::new(0));
    let mut manager = DeviceManager::with_driver(StubbornDriver {
        opened: opened.clone(),
    });

    assert_eq!(manager.get_default_device_serial_number()?, "STUBBORN");
    assert_eq!(opened.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn driver_failures_surface_as_operation_failed() -> Result<()> {
    let opened = Arc::new(AtomicUsize::new(0));
    let mut manager = DeviceManager::with_driver(StubbornDriver {
        opened: opened.clone(),
    });
    let mut device = manager.open_default_device()?;
    assert_eq!(opened.load(Ordering::SeqCst), 1);

    assert!(matches!(device.start(), Err(CameraError::OperationFailed("start"))));
    assert!(matches!(
        device.start_streams(true, true),
        Err(CameraError::OperationFailed("start_streams"))
    ));
    // 失败不改变状态，也不自动重试
    assert_eq!(device.state(), DeviceState::Created);
    Ok(())
}

#[test]
fn unavailable_pipelines_fall_back_to_cpu() -> Result<()> {
    let mut manager = DeviceManager::with_driver(SimDriver::with_devices(vec![SimDeviceSpec::tiny("P")]));

    for requested in PacketPipeline::ALL {
        let device = manager.open_default_device_with_pipeline(requested)?;
        assert_eq!(device.pipeline(), requested.resolve());
        assert!(device.pipeline().is_available());
    }

    let device = manager.open_device_by_serial_with_pipeline("P", PacketPipeline::Cpu)?;
    assert_eq!(device.pipeline(), PacketPipeline::Cpu);
    Ok(())
}

#[test]
#[should_panic(expected = "processing backend")]
fn backend_construction_failure_is_fatal() {
    let driver = SimDriver::with_devices(vec![SimDeviceSpec::tiny("X")]).without_backends();
    let mut manager = DeviceManager::with_driver(driver);
    let _ = manager.open_device_by_id_with_pipeline(0, PacketPipeline::Cpu);
}
