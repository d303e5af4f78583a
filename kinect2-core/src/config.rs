use crate::error::{CameraError, Result};

/// 深度处理参数
///
/// 设置器原样保存数值，不做截断；合法性检查在 [`Config::validate`] 中完成，
/// 并由 `Device::set_config` 在下发前强制执行。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// 最小有效深度 (米)，更近的像素被置为 0
    pub min_depth: f32,
    /// 最大有效深度 (米)，更远的像素被置为 0
    pub max_depth: f32,
    /// 去除 "飞点" 的双边滤波
    pub enable_bilateral_filter: bool,
    /// 边缘感知平滑
    pub enable_edge_aware_filter: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            min_depth: 0.5,
            max_depth: 4.5,
            enable_bilateral_filter: true,
            enable_edge_aware_filter: true,
        }
    }

    pub fn get_min_depth(&self) -> f32 {
        self.min_depth
    }

    pub fn set_min_depth(&mut self, meters: f32) {
        self.min_depth = meters;
    }

    pub fn get_max_depth(&self) -> f32 {
        self.max_depth
    }

    pub fn set_max_depth(&mut self, meters: f32) {
        self.max_depth = meters;
    }

    pub fn get_enable_bilateral_filter(&self) -> bool {
        self.enable_bilateral_filter
    }

    pub fn set_enable_bilateral_filter(&mut self, enable: bool) {
        self.enable_bilateral_filter = enable;
    }

    pub fn get_enable_edge_aware_filter(&self) -> bool {
        self.enable_edge_aware_filter
    }

    pub fn set_enable_edge_aware_filter(&mut self, enable: bool) {
        self.enable_edge_aware_filter = enable;
    }

    /// 链式设置深度范围 (米)
    pub fn depth_range(mut self, min_meters: f32, max_meters: f32) -> Self {
        self.min_depth = min_meters;
        self.max_depth = max_meters;
        self
    }

    pub fn bilateral_filter(mut self, enable: bool) -> Self {
        self.enable_bilateral_filter = enable;
        self
    }

    pub fn edge_aware_filter(mut self, enable: bool) -> Self {
        self.enable_edge_aware_filter = enable;
        self
    }

    /// 深度范围换算到毫米 (深度帧的单位)
    pub fn depth_range_mm(&self) -> (f32, f32) {
        (self.min_depth * 1000.0, self.max_depth * 1000.0)
    }

    /// 检查 `0 < min_depth < max_depth` 且两者都是有限值
    pub fn validate(&self) -> Result<()> {
        if !self.min_depth.is_finite() || !self.max_depth.is_finite() {
            return Err(CameraError::InvalidConfig(format!(
                "depth range must be finite, got [{}, {}]",
                self.min_depth, self.max_depth
            )));
        }
        if self.min_depth <= 0.0 {
            return Err(CameraError::InvalidConfig(format!(
                "min_depth must be positive, got {}",
                self.min_depth
            )));
        }
        if self.min_depth >= self.max_depth {
            return Err(CameraError::InvalidConfig(format!(
                "min_depth ({}) must be below max_depth ({})",
                self.min_depth, self.max_depth
            )));
        }
        Ok(())
    }

    /// 导出为 JSON，便于持久化
    #[cfg(feature = "serialize")]
    pub fn export_state(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| CameraError::InvalidConfig(e.to_string()))
    }
}
