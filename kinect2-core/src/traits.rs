use std::sync::Arc;

use bitflags::bitflags;

use crate::calibration::CameraCalibration;
use crate::config::Config;
use crate::error::Result;
use crate::frame::{FrameType, ListenerSlot, RawFrame};
use crate::pipeline::{PacketPipeline, ProcessingBackend};
use crate::telemetry::StreamTelemetry;

bitflags! {
    /// 需要启动的数据流组合
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Streams: u8 {
        const COLOR = 0b01;
        /// IR 与深度由同一路传感器产生，总是一起启动
        const DEPTH = 0b10;
        const ALL = Self::COLOR.bits() | Self::DEPTH.bits();
    }
}

/// 打开设备时的选择方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelector<'a> {
    /// 从 0 开始的枚举索引
    Index(usize),
    /// 设备序列号
    Serial(&'a str),
}

/// 1. 驱动入口：设备枚举与打开
///
/// 驱动实现返回 `Option`/`bool` 表达成功与否，由 facade 转换为 `CameraError`。
pub trait Driver: Send {
    /// 重新扫描总线，返回已连接的设备数量
    fn enumerate_devices(&mut self) -> usize;

    /// 第 `index` 台设备的序列号 (基于最近一次枚举)
    fn device_serial_number(&self, index: usize) -> Option<String>;

    /// 构造处理后端；硬件或驱动不支持时返回 `None`
    fn create_backend(&self, pipeline: PacketPipeline) -> Option<Box<dyn ProcessingBackend>>;

    /// 打开设备，后端的所有权转移给设备
    fn open(
        &mut self,
        selector: DeviceSelector<'_>,
        backend: Box<dyn ProcessingBackend>,
    ) -> Option<Box<dyn NativeDevice>>;
}

/// 2. 已打开的设备句柄
///
/// 每路数据流在驱动自己的 capture 线程上回调 [`FrameSink`]。
/// `stop`/`close` 返回前必须 join 这些线程。
pub trait NativeDevice: Send {
    fn serial_number(&self) -> String;

    fn firmware_version(&self) -> String;

    /// 启动全部数据流
    fn start(&mut self) -> bool;

    fn start_streams(&mut self, streams: Streams) -> bool;

    fn stop(&mut self) -> bool;

    fn close(&mut self) -> bool;

    /// 替换某个槽位的回调，`None` 表示卸载
    fn set_frame_listener(&mut self, slot: ListenerSlot, sink: Option<Arc<dyn FrameSink>>);

    /// 立即生效，capture 线程在下一帧读取
    fn set_config(&mut self, config: &Config);

    /// 标定数据；设备未上报时为 `None`
    fn calibration(&self) -> Option<CameraCalibration>;

    fn telemetry(&self) -> StreamTelemetry;
}

/// 3. 帧回调的接收端
///
/// 驱动把 [`RawFrame`] 按值交出，之后不再持有缓冲。
/// 返回 `Err` 时驱动记录错误并继续采集。
pub trait FrameSink: Send + Sync {
    fn on_new_frame(&self, frame_type: FrameType, frame: RawFrame) -> Result<()>;
}
