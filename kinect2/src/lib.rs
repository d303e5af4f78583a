//! Kinect v2 深度相机的 Rust 接口
//!
//! ```no_run
//! use kinect2::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut manager = DeviceManager::new()?;
//!     let mut device = manager.open_default_device()?;
//!
//!     device.set_ir_and_depth_frame_listener(Some(FrameListener::sink(|frame_type, frame| {
//!         println!("{:?} #{}", frame_type, frame.sequence());
//!     })));
//!     device.start()?;
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//!     device.stop()?;
//!     device.close()?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod device;
#[cfg(feature = "highgui")]
pub mod highgui;
pub mod imgcodecs;
pub mod listener;
pub mod manager;
pub mod multi_listener;
pub mod registration;

// Re-export 核心类型
pub use kinect2_core::{
    calibration, config, error, frame, logger, pipeline, pixel_format, telemetry, time,
};

pub use backend::BackendType;
pub use device::{Device, DeviceState};
pub use listener::FrameListener;
pub use manager::DeviceManager;
pub use registration::Registration;

/// 预置模块，用户可以通过 `use kinect2::prelude::*;` 导入常用项
pub mod prelude {
    pub use crate::backend::BackendType;
    pub use crate::device::{Device, DeviceState};
    pub use crate::listener::FrameListener;
    pub use crate::manager::DeviceManager;
    pub use crate::multi_listener::{FrameMap, MultiFrameListener};
    pub use crate::registration::Registration;
    pub use kinect2_core::prelude::*;
}
