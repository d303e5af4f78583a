use kinect2_core::calibration::IrCameraParams;

/// 预计算的 IR 查找表
///
/// 对每个 "无畸变" 像素 (行优先) 保存：
/// - 经畸变后最近的原始深度采样下标 (落在图像外则为 `None`)
/// - 归一化射线方向 ((x - cx) / fx, (y - cy) / fy)
#[derive(Debug, Clone)]
pub(crate) struct IrTables {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) distort_map: Vec<Option<usize>>,
    pub(crate) rays: Vec<(f32, f32)>,
}

impl IrTables {
    pub(crate) fn build(ir: &IrCameraParams) -> Self {
        let (width, height) = (ir.width, ir.height);
        let mut distort_map = Vec::with_capacity(width * height);
        let mut rays = Vec::with_capacity(width * height);

        for y in 0..height {
            for x in 0..width {
                let xn = (x as f32 - ir.cx) / ir.fx;
                let yn = (y as f32 - ir.cy) / ir.fy;
                rays.push((xn, yn));

                let (xd, yd) = ir.distort(xn, yn);
                let u = (xd * ir.fx + ir.cx + 0.5).floor();
                let v = (yd * ir.fy + ir.cy + 0.5).floor();
                let inside = u >= 0.0 && v >= 0.0 && (u as usize) < width && (v as usize) < height;
                distort_map.push(inside.then(|| v as usize * width + u as usize));
            }
        }

        Self {
            width,
            height,
            distort_map,
            rays,
        }
    }

    /// 按查找表重采样，无效 (<= 0 或非有限) 的深度置 0
    pub(crate) fn undistort(&self, raw: &[f32]) -> Vec<f32> {
        self.distort_map
            .iter()
            .map(|index| match index.and_then(|i| raw.get(i)) {
                Some(&z) if z.is_finite() && z > 0.0 => z,
                _ => 0.0,
            })
            .collect()
    }
}
