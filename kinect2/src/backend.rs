#[cfg(not(feature = "simulation"))]
use kinect2_core::error::CameraError;
use kinect2_core::error::Result;
use kinect2_core::traits::Driver;

/// `DeviceManager` 当前使用的驱动来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// 软件模拟的 Kinect v2
    Simulation,
    /// 调用方通过 `DeviceManager::with_driver` 注入的驱动
    External,
}

/// 创建默认驱动实例的工厂函数
#[cfg(feature = "simulation")]
pub fn create_driver() -> Result<Box<dyn Driver>> {
    Ok(Box::new(kinect2_simulation::SimDriver::new()))
}

/// 创建默认驱动实例的工厂函数
#[cfg(not(feature = "simulation"))]
pub fn create_driver() -> Result<Box<dyn Driver>> {
    // 如果没有编译任何后端，返回错误
    Err(CameraError::BackendUnavailable(
        "no driver compiled in; enable the `simulation` feature or use DeviceManager::with_driver"
            .to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "simulation")]
    #[test]
    fn simulation_is_the_default_driver() {
        let mut driver = create_driver().unwrap();
        assert_eq!(driver.enumerate_devices(), 1);
    }

    #[cfg(not(feature = "simulation"))]
    #[test]
    fn missing_driver_is_an_error() {
        assert!(matches!(create_driver(), Err(CameraError::BackendUnavailable(_))));
    }
}
