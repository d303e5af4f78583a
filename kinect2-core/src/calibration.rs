//! 相机标定参数
//!
//! IR (深度) 相机带 Brown-Conrady 畸变模型；彩色相机只有针孔内参。
//! 外参描述 IR 坐标系到彩色坐标系的刚体变换，平移单位为毫米。

#[cfg(feature = "serialize")]
use crate::error::{CameraError, Result};

/// IR / 深度相机内参
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct IrCameraParams {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    /// 径向畸变
    pub k1: f32,
    pub k2: f32,
    pub k3: f32,
    /// 切向畸变
    pub p1: f32,
    pub p2: f32,
    pub width: usize,
    pub height: usize,
}

impl Default for IrCameraParams {
    fn default() -> Self {
        Self {
            fx: 365.456,
            fy: 365.456,
            cx: 256.0,
            cy: 212.0,
            k1: 0.0905474,
            k2: -0.26819,
            k3: 0.0950862,
            p1: 0.0,
            p2: 0.0,
            width: 512,
            height: 424,
        }
    }
}

impl IrCameraParams {
    /// 对归一化坐标 (x, y) 施加畸变
    pub fn distort(&self, x: f32, y: f32) -> (f32, f32) {
        let x2 = x * x;
        let y2 = y * y;
        let r2 = x2 + y2;
        let xy = x * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;

        let xd = x * radial + 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x2);
        let yd = y * radial + self.p1 * (r2 + 2.0 * y2) + 2.0 * self.p2 * xy;
        (xd, yd)
    }
}

/// 彩色相机内参
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorCameraParams {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: usize,
    pub height: usize,
}

impl Default for ColorCameraParams {
    fn default() -> Self {
        Self {
            fx: 1081.37,
            fy: 1081.37,
            cx: 959.5,
            cy: 539.5,
            width: 1920,
            height: 1080,
        }
    }
}

/// IR -> 彩色 的刚体变换
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Extrinsics {
    /// 行优先的 3x3 旋转矩阵
    pub rotation: [[f32; 3]; 3],
    /// 平移 (毫米)
    pub translation: [f32; 3],
}

impl Extrinsics {
    pub const IDENTITY: Extrinsics = Extrinsics {
        rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        translation: [0.0, 0.0, 0.0],
    };

    pub fn transform(&self, p: [f32; 3]) -> [f32; 3] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2] + t[0],
            r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2] + t[1],
            r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2] + t[2],
        ]
    }
}

impl Default for Extrinsics {
    fn default() -> Self {
        // 两个传感器水平间距约 5.2cm
        Self {
            translation: [52.0, 0.0, 0.0],
            ..Self::IDENTITY
        }
    }
}

/// 设备完整标定快照
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CameraCalibration {
    pub ir: IrCameraParams,
    pub color: ColorCameraParams,
    pub extrinsics: Extrinsics,
}

impl CameraCalibration {
    /// 导出为 JSON，便于持久化
    #[cfg(feature = "serialize")]
    pub fn export_state(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| CameraError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_coefficients_leave_points_untouched() {
        let ir = IrCameraParams {
            k1: 0.0,
            k2: 0.0,
            k3: 0.0,
            ..Default::default()
        };
        assert_eq!(ir.distort(0.3, -0.2), (0.3, -0.2));
    }

    #[test]
    fn radial_distortion_is_symmetric() {
        let ir = IrCameraParams::default();
        let (x, y) = ir.distort(0.4, 0.4);
        let (nx, ny) = ir.distort(-0.4, -0.4);
        assert!((x + nx).abs() < 1e-6);
        assert!((y + ny).abs() < 1e-6);
    }

    #[test]
    fn default_extrinsics_shift_along_x() {
        let p = Extrinsics::default().transform([0.0, 0.0, 1000.0]);
        assert_eq!(p, [52.0, 0.0, 1000.0]);
        assert_eq!(Extrinsics::IDENTITY.transform([1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
    }
}
