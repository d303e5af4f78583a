//! 深度图平滑
//!
//! 两个滤波器都在 3x3 邻域上工作，无效像素 (<= 0 或非有限值) 既不参与也不被填充；
//! 非有限值在输出中统一置为 0。

/// 双边滤波的空间 sigma (像素)
const SPATIAL_SIGMA: f32 = 1.0;
/// 双边滤波的值域 sigma (毫米)
const RANGE_SIGMA: f32 = 40.0;
/// 边缘感知滤波：与中心深度差超过该值的邻居视为跨越边缘 (毫米)
const EDGE_THRESHOLD_MM: f32 = 30.0;
/// 少于该数量的一致邻居时，中心像素视为飞点
const MIN_CONSISTENT_NEIGHBOURS: usize = 2;

fn neighbours(
    width: usize,
    height: usize,
    x: usize,
    y: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let x0 = x.saturating_sub(1);
    let y0 = y.saturating_sub(1);
    let x1 = (x + 1).min(width - 1);
    let y1 = (y + 1).min(height - 1);
    (y0..=y1).flat_map(move |ny| (x0..=x1).map(move |nx| (nx, ny)))
}

fn is_valid(z: f32) -> bool {
    z.is_finite() && z > 0.0
}

/// 双边滤波：权重 = 空间高斯 × 深度差高斯
pub fn bilateral(depth: &mut [f32], width: usize, height: usize) {
    if width == 0 || height == 0 || depth.len() != width * height {
        return;
    }
    let src = depth.to_vec();
    let s2 = 2.0 * SPATIAL_SIGMA * SPATIAL_SIGMA;
    let r2 = 2.0 * RANGE_SIGMA * RANGE_SIGMA;

    for y in 0..height {
        for x in 0..width {
            let z = src[y * width + x];
            if !is_valid(z) {
                if !z.is_finite() {
                    depth[y * width + x] = 0.0;
                }
                continue;
            }

            let mut sum = 0.0;
            let mut weight_sum = 0.0;
            for (nx, ny) in neighbours(width, height, x, y) {
                let nz = src[ny * width + nx];
                if !is_valid(nz) {
                    continue;
                }
                let dx = nx as f32 - x as f32;
                let dy = ny as f32 - y as f32;
                let dz = nz - z;
                let w = (-(dx * dx + dy * dy) / s2).exp() * (-(dz * dz) / r2).exp();
                sum += w * nz;
                weight_sum += w;
            }
            // 中心像素自身权重为 1，weight_sum 不会为 0
            depth[y * width + x] = sum / weight_sum;
        }
    }
}

/// 边缘感知平滑：只平均同一表面上的邻居，孤立的飞点被置为 0
pub fn edge_aware(depth: &mut [f32], width: usize, height: usize) {
    if width == 0 || height == 0 || depth.len() != width * height {
        return;
    }
    let src = depth.to_vec();

    for y in 0..height {
        for x in 0..width {
            let z = src[y * width + x];
            if !is_valid(z) {
                if !z.is_finite() {
                    depth[y * width + x] = 0.0;
                }
                continue;
            }

            let mut sum = 0.0;
            let mut count = 0usize;
            let mut valid = 0usize;
            for (nx, ny) in neighbours(width, height, x, y) {
                let nz = src[ny * width + nx];
                if !is_valid(nz) {
                    continue;
                }
                if (nx, ny) != (x, y) {
                    valid += 1;
                }
                if (nz - z).abs() <= EDGE_THRESHOLD_MM {
                    sum += nz;
                    count += 1;
                }
            }

            // count 包含中心像素本身 (中心有效，至少为 1)
            let consistent = count.saturating_sub(1);
            depth[y * width + x] = if valid > 0 && consistent < MIN_CONSISTENT_NEIGHBOURS {
                0.0
            } else {
                sum / count as f32
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_surface_is_unchanged() {
        let mut depth = vec![1500.0; 16];
        bilateral(&mut depth, 4, 4);
        edge_aware(&mut depth, 4, 4);
        assert!(depth.iter().all(|&z| (z - 1500.0).abs() < 1e-3));
    }

    #[test]
    fn edge_aware_removes_flying_pixel() {
        let mut depth = vec![1000.0; 9];
        depth[4] = 2500.0;
        edge_aware(&mut depth, 3, 3);
        assert_eq!(depth[4], 0.0);
        assert_eq!(depth[0], 1000.0);
    }

    #[test]
    fn invalid_pixels_stay_invalid() {
        let mut depth = vec![0.0, 1000.0, 1000.0, 1000.0];
        bilateral(&mut depth, 2, 2);
        assert_eq!(depth[0], 0.0);
        assert!((depth[1] - 1000.0).abs() < 1e-3);
    }

    #[test]
    fn non_finite_samples_become_invalid() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let mut depth = vec![1000.0; 9];
            depth[4] = bad;
            edge_aware(&mut depth, 3, 3);
            assert_eq!(depth[4], 0.0);
            assert!(depth.iter().all(|z| z.is_finite()));

            let mut depth = vec![1000.0; 9];
            depth[4] = bad;
            bilateral(&mut depth, 3, 3);
            assert_eq!(depth[4], 0.0);
            // 邻居不受污染
            assert!((depth[0] - 1000.0).abs() < 1e-3);
        }
    }

    #[test]
    fn bilateral_reduces_small_noise() {
        let mut depth = vec![1000.0; 9];
        depth[4] = 1010.0;
        bilateral(&mut depth, 3, 3);
        assert!(depth[4] < 1010.0 && depth[4] > 1000.0);
    }
}
