use thiserror::Error;

use crate::frame::FrameType;

#[derive(Error, Debug)]
pub enum CameraError {
    /// 打开设备失败 (没有硬件，或序列号/索引不匹配)
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Device index {index} out of range ({count} devices attached)")]
    DeviceNotFound { index: usize, count: usize },

    /// 生命周期状态机不允许该操作 (例如在 Closed 状态下 start)
    #[error("Operation `{op}` is not allowed while the device is {state}")]
    InvalidState { op: &'static str, state: &'static str },

    /// 驱动返回了 false，调用方可自行决定是否重试
    #[error("Driver reported failure for `{0}`")]
    OperationFailed(&'static str),

    #[error("Calibration data unavailable: {0}")]
    CalibrationUnavailable(String),

    /// 消费者回调返回的错误，经由 capture 线程向驱动传播
    #[error("{frame_type:?} frame listener failed: {message}")]
    Listener {
        frame_type: FrameType,
        message: String,
    },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No driver backend available: {0}")]
    BackendUnavailable(String),

    #[error("Timed out waiting for frames")]
    Timeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CameraError>;
