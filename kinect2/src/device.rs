use std::fmt;

use kinect2_core::config::Config;
use kinect2_core::error::{CameraError, Result};
use kinect2_core::frame::ListenerSlot;
use kinect2_core::pipeline::PacketPipeline;
use kinect2_core::telemetry::StreamTelemetry;
use kinect2_core::traits::{NativeDevice, Streams};

use crate::listener::FrameListener;
use crate::registration::Registration;

/// 设备生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// 已打开，尚未启动
    Created,
    Started,
    Stopped,
    Closed,
}

impl DeviceState {
    fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Closed => "closed",
        }
    }
}

/// 一台已打开的 Kinect v2
///
/// 所有修改都经由 `&mut self`，设备本身不加锁；跨线程共享时由调用方同步。
/// `Drop` 时如果还没有 close，会自动释放原生句柄。
pub struct Device {
    native: Box<dyn NativeDevice>,
    serial: String,
    firmware: String,
    state: DeviceState,
    color_listener: Option<FrameListener>,
    ir_depth_listener: Option<FrameListener>,
    config: Config,
    pipeline: PacketPipeline,
}

impl Device {
    pub(crate) fn new(native: Box<dyn NativeDevice>, pipeline: PacketPipeline) -> Self {
        let serial = native.serial_number();
        let firmware = native.firmware_version();
        tracing::info!(%serial, %firmware, %pipeline, "Device opened");
        Self {
            native,
            serial,
            firmware,
            state: DeviceState::Created,
            color_listener: None,
            ir_depth_listener: None,
            config: Config::default(),
            pipeline,
        }
    }

    pub fn serial_number(&self) -> &str {
        &self.serial
    }

    pub fn firmware_version(&self) -> &str {
        &self.firmware
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// 实际生效的处理流水线 (已完成回退)
    pub fn pipeline(&self) -> PacketPipeline {
        self.pipeline
    }

    /// 最近一次成功下发的 Config
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn telemetry(&self) -> StreamTelemetry {
        self.native.telemetry()
    }

    fn require(&self, op: &'static str, allowed: &[DeviceState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CameraError::InvalidState {
                op,
                state: self.state.name(),
            })
        }
    }

    fn transition(&mut self, op: &'static str, ok: bool, next: DeviceState) -> Result<()> {
        if !ok {
            tracing::warn!(serial = %self.serial, op, "Driver reported failure");
            return Err(CameraError::OperationFailed(op));
        }
        tracing::info!(serial = %self.serial, op, "Device {}", next.name());
        self.state = next;
        Ok(())
    }

    /// 启动全部数据流 (彩色 + IR/深度)
    pub fn start(&mut self) -> Result<()> {
        self.require("start", &[DeviceState::Created, DeviceState::Stopped])?;
        let ok = self.native.start();
        self.transition("start", ok, DeviceState::Started)
    }

    /// 只启动部分数据流，两者都为 false 时拒绝
    pub fn start_streams(&mut self, rgb: bool, depth: bool) -> Result<()> {
        self.require("start_streams", &[DeviceState::Created, DeviceState::Stopped])?;

        let mut streams = Streams::empty();
        streams.set(Streams::COLOR, rgb);
        streams.set(Streams::DEPTH, depth);
        if streams.is_empty() {
            return Err(CameraError::OperationFailed("start_streams"));
        }

        let ok = self.native.start_streams(streams);
        self.transition("start_streams", ok, DeviceState::Started)
    }

    /// 停止采集；返回时 capture 线程上不再有回调在执行
    pub fn stop(&mut self) -> Result<()> {
        self.require("stop", &[DeviceState::Started])?;
        let ok = self.native.stop();
        self.transition("stop", ok, DeviceState::Stopped)
    }

    /// 释放原生句柄
    pub fn close(&mut self) -> Result<()> {
        self.require("close", &[DeviceState::Started, DeviceState::Stopped])?;
        let ok = self.native.close();
        self.transition("close", ok, DeviceState::Closed)?;
        self.color_listener = None;
        self.ir_depth_listener = None;
        Ok(())
    }

    /// 替换彩色槽位的 listener，`None` 表示卸载
    pub fn set_color_frame_listener(&mut self, listener: Option<FrameListener>) {
        self.set_listener(ListenerSlot::Color, listener);
    }

    /// 替换 IR + 深度槽位的 listener，`None` 表示卸载
    pub fn set_ir_and_depth_frame_listener(&mut self, listener: Option<FrameListener>) {
        self.set_listener(ListenerSlot::IrAndDepth, listener);
    }

    fn set_listener(&mut self, slot: ListenerSlot, listener: Option<FrameListener>) {
        let sink = listener.as_ref().map(FrameListener::as_sink);
        self.native.set_frame_listener(slot, sink);

        let target = match slot {
            ListenerSlot::Color => &mut self.color_listener,
            ListenerSlot::IrAndDepth => &mut self.ir_depth_listener,
        };
        *target = listener;
        tracing::debug!(serial = %self.serial, ?slot, attached = target.is_some(), "Listener replaced");
    }

    /// 校验后立即下发
    pub fn set_config(&mut self, config: &Config) -> Result<()> {
        self.require(
            "set_config",
            &[DeviceState::Created, DeviceState::Started, DeviceState::Stopped],
        )?;
        config.validate()?;
        self.native.set_config(config);
        self.config = *config;
        Ok(())
    }

    /// 以当前标定与 Config 创建配准引擎
    pub fn get_registration(&self) -> Result<Registration> {
        self.require(
            "get_registration",
            &[DeviceState::Created, DeviceState::Started, DeviceState::Stopped],
        )?;
        let calibration = self.native.calibration().ok_or_else(|| {
            CameraError::CalibrationUnavailable(format!(
                "device {} has not reported camera parameters",
                self.serial
            ))
        })?;
        Ok(Registration::new(calibration, &self.config))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.state != DeviceState::Closed {
            if !self.native.close() {
                tracing::warn!(serial = %self.serial, "Failed to release device on drop");
            }
            self.state = DeviceState::Closed;
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("serial", &self.serial)
            .field("firmware", &self.firmware)
            .field("state", &self.state)
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
