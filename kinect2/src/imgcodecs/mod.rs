use std::path::Path;

use anyhow::{anyhow, Result};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use kinect2_core::frame::{Frame, FrameDescriptor};
use kinect2_core::pixel_format::FrameFormat;

/// 深度/IR 的浮点图
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// 帧转换为 `image` crate 的图像类型后的结果
#[derive(Debug, Clone)]
pub enum FrameImage {
    /// RGB/BGR/RGBX/BGRX 统一转换为 RGB8
    Rgb(RgbImage),
    /// Gray 以及 Bayer 原始马赛克 (不做 Demosaic)
    Gray(GrayImage),
    /// Float 帧 (深度: 毫米; IR: 强度)
    Depth(FloatImage),
    /// Raw / Invalid 无法解释为图像
    Invalid,
}

/// 把帧转换为图像 (总是拷贝)
pub fn to_image(frame: &Frame) -> FrameImage {
    let (w, h) = (frame.width() as u32, frame.height() as u32);
    let data = frame.data();
    let format = frame.format();

    let image = match format {
        FrameFormat::Rgb | FrameFormat::Bgr | FrameFormat::Rgbx | FrameFormat::Bgrx => {
            // is_color 的格式一定有通道偏移
            let Some([r, g, b]) = format.rgb_offsets() else {
                return FrameImage::Invalid;
            };
            let bpp = frame.bytes_per_pixel();
            let mut rgb = Vec::with_capacity(frame.width() * frame.height() * 3);
            for px in data.chunks_exact(bpp) {
                rgb.extend_from_slice(&[px[r], px[g], px[b]]);
            }
            RgbImage::from_raw(w, h, rgb).map(FrameImage::Rgb)
        }
        FrameFormat::Gray
        | FrameFormat::BayerRggb
        | FrameFormat::BayerBggr
        | FrameFormat::BayerGrbg
        | FrameFormat::BayerGbrg => GrayImage::from_raw(w, h, data.to_vec()).map(FrameImage::Gray),
        FrameFormat::Float => match frame.float_values() {
            Ok(values) => FloatImage::from_raw(w, h, values).map(FrameImage::Depth),
            Err(_) => None,
        },
        FrameFormat::Raw | FrameFormat::Invalid => None,
    };

    image.unwrap_or(FrameImage::Invalid)
}

/// 保存帧到文件，格式由扩展名决定
///
/// 彩色保存为 RGB8，灰度为 8 位，深度按毫米保存为 16 位灰度 (推荐 PNG)。
pub fn imwrite<P: AsRef<Path>>(path: P, frame: &Frame) -> Result<()> {
    let path = path.as_ref();
    let saved = match to_image(frame) {
        FrameImage::Rgb(img) => img.save(path),
        FrameImage::Gray(img) => img.save(path),
        FrameImage::Depth(img) => {
            let (w, h) = img.dimensions();
            let mm: Vec<u16> = img
                .into_raw()
                .into_iter()
                .map(|z| if z.is_finite() { z.clamp(0.0, u16::MAX as f32) as u16 } else { 0 })
                .collect();
            let depth = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w, h, mm)
                .ok_or_else(|| anyhow!("Depth buffer does not match {}x{}", w, h))?;
            depth.save(path)
        }
        FrameImage::Invalid => {
            return Err(anyhow!(
                "Frames in {} format cannot be saved as an image",
                frame.format()
            ))
        }
    };
    saved.map_err(|e| anyhow!("Failed to save image: {}", e))?;

    tracing::debug!(path = %path.display(), format = %frame.format(), "Frame written");
    Ok(())
}

/// 读取图像文件为 RGB 帧 (测试与离线配准使用)
pub fn imread<P: AsRef<Path>>(path: P) -> Result<Frame> {
    let img = image::open(path).map_err(|e| anyhow!("Failed to open image: {}", e))?;
    let rgb = img.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    let descriptor = FrameDescriptor::new(w, h, 3, FrameFormat::Rgb);
    Ok(Frame::from_vec(descriptor, rgb.into_raw())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("kinect2-{}-{}", std::process::id(), name))
    }

    #[test]
    fn bgrx_becomes_rgb() {
        let frame = Frame::from_vec(
            FrameDescriptor::new(2, 1, 4, FrameFormat::Bgrx),
            vec![1, 2, 3, 0, 4, 5, 6, 0],
        )
        .unwrap();
        match to_image(&frame) {
            FrameImage::Rgb(img) => assert_eq!(img.into_raw(), vec![3, 2, 1, 6, 5, 4]),
            other => panic!("unexpected image {:?}", other),
        }
    }

    #[test]
    fn raw_frames_have_no_image() {
        let frame = Frame::from_vec(FrameDescriptor::new(2, 2, 2, FrameFormat::Raw), vec![0; 8]).unwrap();
        assert!(matches!(to_image(&frame), FrameImage::Invalid));
        assert!(imwrite(temp_path("raw.png"), &frame).is_err());
    }

    #[test]
    fn depth_is_saved_in_millimetres() -> Result<()> {
        let path = temp_path("depth.png");
        let frame = Frame::from_depth(3, 1, &[0.0, 1234.4, 70000.0])?;
        imwrite(&path, &frame)?;

        let saved = image::open(&path)?.to_luma16();
        std::fs::remove_file(&path)?;
        assert_eq!(saved.into_raw(), vec![0, 1234, u16::MAX]);
        Ok(())
    }

    #[test]
    fn color_frames_survive_png() -> Result<()> {
        let path = temp_path("color.png");
        let frame = Frame::from_vec(
            FrameDescriptor::new(2, 1, 3, FrameFormat::Bgr),
            vec![10, 20, 30, 40, 50, 60],
        )?;
        imwrite(&path, &frame)?;
        let back = imread(&path)?;
        std::fs::remove_file(&path)?;

        assert_eq!(back.format(), FrameFormat::Rgb);
        assert_eq!(back.data(), &[30, 20, 10, 60, 50, 40]);
        Ok(())
    }
}
