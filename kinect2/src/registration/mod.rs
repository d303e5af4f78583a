//! 深度 -> 彩色 配准
//!
//! 流程：
//! 1. 无畸变像素 -> 经 IR 畸变模型 -> 最近的原始深度采样 (去畸变)
//! 2. 有效深度 z (毫米) 沿射线反投影到 IR 坐标系
//! 3. 外参变换到彩色坐标系，再用彩色内参投影，四舍五入到最近的彩色像素
//! 4. 彩色采样写入深度分辨率的配准图；全分辨率深度图按 "近者优先" 做 z-buffer

mod tables;

use kinect2_core::calibration::CameraCalibration;
use kinect2_core::config::Config;
use kinect2_core::error::{CameraError, Result};
use kinect2_core::filter;
use kinect2_core::frame::{Frame, FrameDescriptor, PixelValue};
use kinect2_core::pixel_format::FrameFormat;

use self::tables::IrTables;

/// 启用滤波时，彩色采样的深度比 z-buffer 远超过该比例即视为被遮挡
const OCCLUSION_RATIO: f32 = 1.01;

/// 配准引擎
///
/// 绑定创建时刻的标定与滤波开关快照，之后不可变；所有方法都是只读的，
/// 可以在多个线程间共享 (`Send + Sync`)。
#[derive(Debug, Clone)]
pub struct Registration {
    calibration: CameraCalibration,
    config: Config,
    tables: IrTables,
}

/// 单个深度像素在彩色图上的落点
#[derive(Debug, Clone, Copy)]
struct Projection {
    depth_index: usize,
    color_x: usize,
    color_y: usize,
    z: f32,
}

struct Registered {
    undistorted: Frame,
    registered: Frame,
    big_depth: Frame,
}

impl Registration {
    pub fn new(calibration: CameraCalibration, config: &Config) -> Self {
        Self {
            tables: IrTables::build(&calibration.ir),
            calibration,
            config: *config,
        }
    }

    pub fn calibration(&self) -> &CameraCalibration {
        &self.calibration
    }

    /// 创建时的 Config 快照
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 仅去畸变
    pub fn undistort_depth(&self, depth: &Frame) -> Result<Frame> {
        let raw = self.check_depth(depth)?;
        let undistorted = self.tables.undistort(&raw);
        Ok(Frame::from_depth(self.tables.width, self.tables.height, &undistorted)?
            .with_metadata(*depth.metadata()))
    }

    /// 返回 (去畸变深度, 深度分辨率的配准彩色图)
    pub fn apply_depth_to_color(
        &self,
        depth: &Frame,
        color: &Frame,
        enable_filter: bool,
    ) -> Result<(Frame, Frame)> {
        let out = self.register(depth, color, enable_filter)?;
        Ok((out.undistorted, out.registered))
    }

    /// 返回 (去畸变深度, 配准彩色图, 全分辨率深度图)
    ///
    /// 全分辨率深度图尺寸为 彩色宽 x (彩色高 + 2)，首尾各一行空白保护行，
    /// 只由标定决定，与输入彩色帧无关。
    pub fn apply_depth_to_full_color(
        &self,
        depth: &Frame,
        color: &Frame,
        enable_filter: bool,
    ) -> Result<(Frame, Frame, Frame)> {
        let out = self.register(depth, color, enable_filter)?;
        Ok((out.undistorted, out.registered, out.big_depth))
    }

    /// 去畸变深度图上 (row, col) 处的三维点 (米)，无效深度返回 `None`
    pub fn point_xyz(&self, undistorted: &Frame, row: usize, col: usize) -> Option<[f32; 3]> {
        if undistorted.width() != self.tables.width || undistorted.height() != self.tables.height {
            return None;
        }
        let z = match undistorted.pixel(col, row)? {
            PixelValue::Float(z) if z.is_finite() && z > 0.0 => z,
            _ => return None,
        };
        let (xn, yn) = self.tables.rays[row * self.tables.width + col];
        Some([xn * z / 1000.0, yn * z / 1000.0, z / 1000.0])
    }

    /// 带颜色的三维点；配准图上没有颜色的像素返回 `None`
    pub fn point_xyzrgb(
        &self,
        undistorted: &Frame,
        registered: &Frame,
        row: usize,
        col: usize,
    ) -> Option<([f32; 3], [u8; 3])> {
        let xyz = self.point_xyz(undistorted, row, col)?;
        let rgb = match registered.pixel(col, row)? {
            PixelValue::Rgb { r, g, b } => [r, g, b],
            PixelValue::Gray(g) => [g, g, g],
            _ => return None,
        };
        Some((xyz, rgb))
    }

    fn check_depth(&self, depth: &Frame) -> Result<Vec<f32>> {
        if depth.format() != FrameFormat::Float {
            return Err(CameraError::InvalidFrame(format!(
                "depth frame must be Float, got {}",
                depth.format()
            )));
        }
        if depth.width() != self.tables.width || depth.height() != self.tables.height {
            return Err(CameraError::InvalidFrame(format!(
                "depth frame is {}x{}, calibration expects {}x{}",
                depth.width(),
                depth.height(),
                self.tables.width,
                self.tables.height
            )));
        }
        depth.float_values()
    }

    fn check_color(&self, color: &Frame) -> Result<()> {
        let params = &self.calibration.color;
        if color.format() == FrameFormat::Invalid || color.bytes_per_pixel() == 0 {
            return Err(CameraError::InvalidFrame(
                "color frame has no usable pixel format".to_string(),
            ));
        }
        if color.width() != params.width || color.height() != params.height {
            return Err(CameraError::InvalidFrame(format!(
                "color frame is {}x{}, calibration expects {}x{}",
                color.width(),
                color.height(),
                params.width,
                params.height
            )));
        }
        Ok(())
    }

    /// 深度平滑，开关取自创建时的 Config 快照
    fn smooth(&self, depth: &mut [f32]) {
        let (w, h) = (self.tables.width, self.tables.height);
        if self.config.enable_bilateral_filter {
            filter::bilateral(depth, w, h);
        }
        if self.config.enable_edge_aware_filter {
            filter::edge_aware(depth, w, h);
        }
    }

    fn project(&self, depth: &[f32]) -> Vec<Projection> {
        let color = &self.calibration.color;
        let extrinsics = &self.calibration.extrinsics;

        depth
            .iter()
            .zip(&self.tables.rays)
            .enumerate()
            .filter(|(_, (z, _))| **z > 0.0)
            .filter_map(|(depth_index, (&z, &(xn, yn)))| {
                let [x, y, zc] = extrinsics.transform([xn * z, yn * z, z]);
                if zc <= 0.0 {
                    return None;
                }
                let u = (color.fx * x / zc + color.cx + 0.5).floor();
                let v = (color.fy * y / zc + color.cy + 0.5).floor();
                if u < 0.0 || v < 0.0 || u >= color.width as f32 || v >= color.height as f32 {
                    return None;
                }
                Some(Projection {
                    depth_index,
                    color_x: u as usize,
                    color_y: v as usize,
                    z: zc,
                })
            })
            .collect()
    }

    fn register(&self, depth: &Frame, color: &Frame, enable_filter: bool) -> Result<Registered> {
        // 1. 校验输入
        let raw = self.check_depth(depth)?;
        self.check_color(color)?;

        let (cw, ch) = (self.calibration.color.width, self.calibration.color.height);
        let (dw, dh) = (self.tables.width, self.tables.height);
        let bpp = color.bytes_per_pixel();

        // 2. 去畸变；滤波只作用于用来投影的副本
        let undistorted = self.tables.undistort(&raw);
        let mut working = undistorted.clone();
        if enable_filter {
            self.smooth(&mut working);
        }

        // 3. 投影到彩色平面
        let projections = self.project(&working);

        // 4. z-buffer (近者优先)。行号 +1 跳过顶部保护行
        let mut big = vec![f32::INFINITY; cw * (ch + 2)];
        for p in &projections {
            if enable_filter {
                // 5x3 邻域泼溅
                let rows = p.color_y..=p.color_y + 2;
                let cols = p.color_x.saturating_sub(2)..=(p.color_x + 2).min(cw - 1);
                for row in rows {
                    for col in cols.clone() {
                        let cell = &mut big[row * cw + col];
                        *cell = cell.min(p.z);
                    }
                }
            } else {
                let cell = &mut big[(p.color_y + 1) * cw + p.color_x];
                *cell = cell.min(p.z);
            }
        }

        // 5. 取色；启用滤波时剔除被遮挡的采样
        let color_data = color.data();
        let mut registered = vec![0u8; dw * dh * bpp];
        for p in &projections {
            if enable_filter {
                let nearest = big[(p.color_y + 1) * cw + p.color_x];
                if p.z / nearest > OCCLUSION_RATIO {
                    continue;
                }
            }
            let src = (p.color_y * cw + p.color_x) * bpp;
            let dst = p.depth_index * bpp;
            registered[dst..dst + bpp].copy_from_slice(&color_data[src..src + bpp]);
        }

        for z in big.iter_mut().filter(|z| z.is_infinite()) {
            *z = 0.0;
        }

        tracing::trace!(
            mapped = projections.len(),
            enable_filter,
            "Registered depth onto color"
        );

        let registered = Frame::from_vec(
            FrameDescriptor::new(dw, dh, bpp, color.format()).with_metadata(*color.metadata()),
            registered,
        )?;
        Ok(Registered {
            undistorted: Frame::from_depth(dw, dh, &undistorted)?.with_metadata(*depth.metadata()),
            registered,
            big_depth: Frame::from_depth(cw, ch + 2, &big)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinect2_core::calibration::{ColorCameraParams, Extrinsics, IrCameraParams};

    /// IR 与彩色共光心、无畸变，彩色分辨率为 IR 的一半
    fn fixture() -> CameraCalibration {
        CameraCalibration {
            ir: IrCameraParams {
                fx: 256.0,
                fy: 256.0,
                cx: 256.0,
                cy: 212.0,
                k1: 0.0,
                k2: 0.0,
                k3: 0.0,
                p1: 0.0,
                p2: 0.0,
                width: 512,
                height: 424,
            },
            color: ColorCameraParams {
                fx: 128.0,
                fy: 128.0,
                cx: 128.0,
                cy: 106.0,
                width: 256,
                height: 212,
            },
            extrinsics: Extrinsics::IDENTITY,
        }
    }

    fn no_filters() -> Config {
        Config::new().bilateral_filter(false).edge_aware_filter(false)
    }

    fn depth_with(points: &[(usize, usize, f32)]) -> Frame {
        let mut values = vec![0.0; 512 * 424];
        for &(x, y, z) in points {
            values[y * 512 + x] = z;
        }
        Frame::from_depth(512, 424, &values).unwrap()
    }

    fn color(format: FrameFormat) -> Frame {
        let bpp = format.bytes_per_pixel().unwrap_or(2);
        let mut data = vec![0u8; 256 * 212 * bpp];
        // (5, 5) 处写入可识别的字节
        let at = (5 * 256 + 5) * bpp;
        for (i, b) in data[at..at + bpp].iter_mut().enumerate() {
            *b = 100 + i as u8;
        }
        Frame::from_vec(FrameDescriptor::new(256, 212, bpp, format), data).unwrap()
    }

    #[test]
    fn nearer_depth_wins_on_collision() {
        let reg = Registration::new(fixture(), &no_filters());
        let depth = depth_with(&[(9, 10, 1000.0), (10, 10, 2000.0)]);

        let (_, registered, big) = reg
            .apply_depth_to_full_color(&depth, &color(FrameFormat::Bgrx), false)
            .unwrap();

        assert_eq!((big.width(), big.height()), (256, 214));
        let big = big.float_values().unwrap();
        assert_eq!(big[(5 + 1) * 256 + 5], 1000.0);
        // 保护行保持为空
        assert!(big[..256].iter().all(|&z| z == 0.0));

        // 两个深度像素都取到同一个彩色采样
        for x in [9, 10] {
            let at = (10 * 512 + x) * 4;
            assert_eq!(&registered.data()[at..at + 4], &[100, 101, 102, 103]);
        }
    }

    #[test]
    fn filtered_registration_drops_occluded_samples() {
        let reg = Registration::new(fixture(), &no_filters());
        let depth = depth_with(&[(9, 10, 1000.0), (10, 10, 2000.0)]);

        let (_, registered) = reg
            .apply_depth_to_color(&depth, &color(FrameFormat::Rgb), true)
            .unwrap();

        let near = (10 * 512 + 9) * 3;
        let far = (10 * 512 + 10) * 3;
        assert_eq!(&registered.data()[near..near + 3], &[100, 101, 102]);
        assert_eq!(&registered.data()[far..far + 3], &[0, 0, 0]);
    }

    #[test]
    fn registered_image_copies_color_format() {
        let reg = Registration::new(fixture(), &no_filters());
        let depth = depth_with(&[(9, 10, 1000.0)]);

        for format in FrameFormat::ALL.into_iter().filter(|f| *f != FrameFormat::Invalid) {
            let color = color(format);
            let (undistorted, registered) =
                reg.apply_depth_to_color(&depth, &color, false).unwrap();
            assert_eq!(registered.format(), format);
            assert_eq!(registered.bytes_per_pixel(), color.bytes_per_pixel());
            assert_eq!((registered.width(), registered.height()), (512, 424));
            assert_eq!(undistorted.format(), FrameFormat::Float);
        }
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let reg = Registration::new(fixture(), &no_filters());
        let depth = depth_with(&[]);

        let small = Frame::alloc(64, 48, FrameFormat::Bgrx).unwrap();
        assert!(matches!(
            reg.apply_depth_to_color(&depth, &small, false),
            Err(CameraError::InvalidFrame(_))
        ));

        let invalid = Frame::from_vec(FrameDescriptor::new(256, 212, 1, FrameFormat::Invalid), vec![0; 256 * 212]).unwrap();
        assert!(reg.apply_depth_to_color(&depth, &invalid, false).is_err());

        let gray_depth = Frame::alloc(512, 424, FrameFormat::Gray).unwrap();
        assert!(reg.undistort_depth(&gray_depth).is_err());
    }

    #[test]
    fn point_cloud_helpers_use_meters() {
        let reg = Registration::new(fixture(), &no_filters());
        let depth = depth_with(&[(256, 212, 1500.0), (9, 10, 1000.0)]);
        let (undistorted, registered) = reg
            .apply_depth_to_color(&depth, &color(FrameFormat::Bgrx), false)
            .unwrap();

        assert_eq!(reg.point_xyz(&undistorted, 212, 256), Some([0.0, 0.0, 1.5]));
        assert_eq!(reg.point_xyz(&undistorted, 0, 0), None);

        let (_, rgb) = reg.point_xyzrgb(&undistorted, &registered, 10, 9).unwrap();
        // BGRX -> RGB
        assert_eq!(rgb, [102, 101, 100]);
    }
}
