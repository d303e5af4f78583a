//! 合成图像生成
//!
//! 场景：2 米处的背景平面，中央一个 1.2 米处的方块。

use kinect2_core::frame::{FrameDescriptor, FrameMetadata, RawFrame};
use kinect2_core::pixel_format::FrameFormat;

use crate::alloc::NativeAllocator;

pub(crate) const BACKGROUND_MM: f32 = 2000.0;
pub(crate) const BOX_MM: f32 = 1200.0;

fn in_box(x: usize, y: usize, width: usize, height: usize) -> bool {
    (width / 4..width * 3 / 4).contains(&x) && (height / 4..height * 3 / 4).contains(&y)
}

/// BGRX 彩色图：横向渐变，随帧序号平移
pub(crate) fn color_pixels(width: usize, height: usize, sequence: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height * 4);
    let shift = sequence as usize;
    for y in 0..height {
        for x in 0..width {
            let r = ((x + shift) * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            let b = if in_box(x, y, width, height) { 200 } else { 40 };
            data.extend_from_slice(&[b, g, r, 0]);
        }
    }
    data
}

/// 深度 (毫米)
pub(crate) fn depth_values(width: usize, height: usize) -> Vec<f32> {
    let mut depth = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            depth.push(if in_box(x, y, width, height) {
                BOX_MM
            } else {
                BACKGROUND_MM
            });
        }
    }
    depth
}

/// IR 强度：近处更亮
pub(crate) fn ir_values(depth: &[f32]) -> Vec<f32> {
    depth
        .iter()
        .map(|&z| if z > 0.0 { 65535.0 * (1000.0 / z).min(1.0) } else { 0.0 })
        .collect()
}

/// 把像素拷贝到 C 堆，组装成交给 listener 的原始帧
pub(crate) fn native_frame(
    allocator: &NativeAllocator,
    descriptor: FrameDescriptor,
    bytes: &[u8],
) -> Option<RawFrame> {
    let buffer = allocator.alloc_copy(bytes)?;
    Some(RawFrame::new(descriptor, buffer))
}

pub(crate) fn color_descriptor(width: usize, height: usize, metadata: FrameMetadata) -> FrameDescriptor {
    FrameDescriptor::new(width, height, 4, FrameFormat::Bgrx).with_metadata(metadata)
}

pub(crate) fn float_descriptor(width: usize, height: usize, metadata: FrameMetadata) -> FrameDescriptor {
    FrameDescriptor::new(width, height, 4, FrameFormat::Float).with_metadata(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_scene_has_box_in_front_of_plane() {
        let depth = depth_values(8, 8);
        assert_eq!(depth[0], BACKGROUND_MM);
        assert_eq!(depth[4 * 8 + 4], BOX_MM);
    }

    #[test]
    fn color_frame_is_bgrx_sized() {
        let data = color_pixels(6, 4, 3);
        assert_eq!(data.len(), 6 * 4 * 4);
        assert!(data.chunks_exact(4).all(|px| px[3] == 0));
    }

    #[test]
    fn ir_is_brighter_for_nearer_surfaces() {
        let ir = ir_values(&[BOX_MM, BACKGROUND_MM, 0.0]);
        assert!(ir[0] > ir[1]);
        assert_eq!(ir[2], 0.0);
    }
}
