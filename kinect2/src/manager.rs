use std::fmt;

use kinect2_core::error::{CameraError, Result};
use kinect2_core::pipeline::PacketPipeline;
use kinect2_core::traits::{DeviceSelector, Driver};

use crate::backend::{self, BackendType};
use crate::device::Device;

/// 设备枚举与打开的入口
pub struct DeviceManager {
    driver: Box<dyn Driver>,
    backend: BackendType,
    /// 最近一次枚举到的设备数量，`None` 表示从未枚举
    device_count: Option<usize>,
}

impl DeviceManager {
    /// 使用默认驱动 (见 [`backend::create_driver`])
    pub fn new() -> Result<Self> {
        Ok(Self::from_boxed(backend::create_driver()?, BackendType::Simulation))
    }

    /// 使用调用方提供的驱动
    pub fn with_driver<D>(driver: D) -> Self
    where
        D: Driver + 'static,
    {
        Self::from_boxed(Box::new(driver), BackendType::External)
    }

    fn from_boxed(driver: Box<dyn Driver>, backend: BackendType) -> Self {
        tracing::debug!(?backend, "Device manager created");
        Self {
            driver,
            backend,
            device_count: None,
        }
    }

    /// 驱动来源：内置模拟驱动，或通过 [`DeviceManager::with_driver`] 注入
    pub fn backend(&self) -> BackendType {
        self.backend
    }

    /// 重新扫描，返回已连接的设备数量
    pub fn enumerate_devices(&mut self) -> usize {
        let count = self.driver.enumerate_devices();
        self.device_count = Some(count);
        tracing::debug!(count, "Enumerated devices");
        count
    }

    fn ensure_enumerated(&mut self) -> usize {
        match self.device_count {
            Some(count) => count,
            None => self.enumerate_devices(),
        }
    }

    pub fn get_device_serial_number(&mut self, index: usize) -> Result<String> {
        let count = self.ensure_enumerated();
        self.driver
            .device_serial_number(index)
            .ok_or(CameraError::DeviceNotFound { index, count })
    }

    /// 第 0 台设备的序列号；不会打开设备
    pub fn get_default_device_serial_number(&mut self) -> Result<String> {
        self.get_device_serial_number(0)
    }

    pub fn open_device_by_id(&mut self, index: usize) -> Result<Device> {
        self.open(DeviceSelector::Index(index), PacketPipeline::default())
    }

    pub fn open_device_by_id_with_pipeline(
        &mut self,
        index: usize,
        pipeline: PacketPipeline,
    ) -> Result<Device> {
        self.open(DeviceSelector::Index(index), pipeline)
    }

    pub fn open_device_by_serial(&mut self, serial: &str) -> Result<Device> {
        self.open(DeviceSelector::Serial(serial), PacketPipeline::default())
    }

    pub fn open_device_by_serial_with_pipeline(
        &mut self,
        serial: &str,
        pipeline: PacketPipeline,
    ) -> Result<Device> {
        self.open(DeviceSelector::Serial(serial), pipeline)
    }

    pub fn open_default_device(&mut self) -> Result<Device> {
        self.open(DeviceSelector::Index(0), PacketPipeline::default())
    }

    pub fn open_default_device_with_pipeline(&mut self, pipeline: PacketPipeline) -> Result<Device> {
        self.open(DeviceSelector::Index(0), pipeline)
    }

    fn open(&mut self, selector: DeviceSelector<'_>, requested: PacketPipeline) -> Result<Device> {
        // 1. 打开前至少枚举一次
        self.ensure_enumerated();

        // 2. 未编译进来的流水线回退到 CPU
        let pipeline = requested.resolve();

        // 3. 构造处理后端。失败属于驱动契约之外的致命错误
        let backend = match self.driver.create_backend(pipeline) {
            Some(backend) => backend,
            None => panic!("driver failed to construct the {} processing backend", pipeline),
        };

        // 4. 打开设备，后端所有权随之转移
        let native = self.driver.open(selector, backend).ok_or_else(|| {
            tracing::warn!(?selector, "No device matches");
            CameraError::DeviceUnavailable(match selector {
                DeviceSelector::Index(index) => format!("no device at index {}", index),
                DeviceSelector::Serial(serial) => format!("no device with serial {}", serial),
            })
        })?;

        Ok(Device::new(native, pipeline))
    }
}

impl fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceManager")
            .field("backend", &self.backend)
            .field("device_count", &self.device_count)
            .finish_non_exhaustive()
    }
}
