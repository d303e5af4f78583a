// 开启一些 Clippy 检查，保证代码质量
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

// 模块定义
pub mod calibration;
pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod logger;
pub mod pipeline;
pub mod pixel_format;
pub mod telemetry;
pub mod time;
pub mod traits;

// 方便用户使用的 Prelude
pub mod prelude {
    pub use crate::calibration::{CameraCalibration, ColorCameraParams, Extrinsics, IrCameraParams};
    pub use crate::config::Config;
    pub use crate::error::{CameraError, Result};
    pub use crate::frame::{Frame, FrameMetadata, FrameType, ListenerSlot, PixelValue};
    pub use crate::logger::{LogLevel, LogSink};
    pub use crate::pipeline::PacketPipeline;
    pub use crate::pixel_format::FrameFormat;
    pub use crate::traits::{DeviceSelector, Driver, FrameSink, NativeDevice, Streams};
}

// 版本与构建信息常量
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
