//! 预览窗口 (需要 `highgui` feature)
//!
//! 按名称管理 minifb 窗口，用法与 OpenCV 的 imshow / waitKey 相同。
//! 窗口属于创建它的线程，所有调用必须在同一个线程上进行。

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use kinect2_core::frame::Frame;
use minifb::{Key, Window, WindowOptions};

use crate::imgcodecs::{to_image, FrameImage};

/// 深度着色的上限 (毫米)，更远的像素显示为最暗
const DEPTH_DISPLAY_MAX_MM: f32 = 4500.0;

thread_local! {
    static WINDOWS: RefCell<HashMap<String, Window>> = RefCell::new(HashMap::new());
}

/// 在指定窗口中显示一帧
///
/// 1. 如果窗口不存在，自动创建。
/// 2. 把帧转换为 minifb 需要的 0RGB u32 缓冲。
/// 3. 刷新窗口内容。
pub fn imshow(winname: &str, frame: &Frame) -> Result<()> {
    let buffer = frame_to_u32_buffer(frame)?;
    let (w, h) = (frame.width(), frame.height());

    WINDOWS.with(|windows| {
        let mut windows = windows.borrow_mut();
        if !windows.contains_key(winname) {
            let window = Window::new(
                winname,
                w,
                h,
                WindowOptions {
                    resize: true,
                    ..WindowOptions::default()
                },
            )
            .map_err(|e| anyhow!("Failed to create window: {}", e))?;
            windows.insert(winname.to_string(), window);
        }

        let window = windows
            .get_mut(winname)
            .ok_or_else(|| anyhow!("Window {} vanished", winname))?;
        window
            .update_with_buffer(&buffer, w, h)
            .map_err(|e| anyhow!("Window update failed: {}", e))
    })
}

/// 等待按键
///
/// 睡眠 `delay_ms` 毫秒后检查所有窗口的按键，返回 ASCII 码，没有按键返回 -1。
/// 任一窗口被关闭时返回 27 (等同 ESC)。
pub fn wait_key(delay_ms: u64) -> i32 {
    if delay_ms > 0 {
        std::thread::sleep(Duration::from_millis(delay_ms));
    }

    WINDOWS.with(|windows| {
        for window in windows.borrow().values() {
            if !window.is_open() || window.is_key_down(Key::Escape) {
                return 27;
            }
            if window.is_key_down(Key::Space) {
                return 32;
            }
            if window.is_key_down(Key::Enter) {
                return 13;
            }
            if window.is_key_down(Key::Q) {
                return 113;
            }
        }
        -1
    })
}

/// 销毁当前线程的所有窗口
pub fn destroy_all_windows() {
    WINDOWS.with(|windows| windows.borrow_mut().clear());
}

/// 将帧转换为 minifb 的 0RGB 缓冲；深度按距离映射为灰度 (近亮远暗)
fn frame_to_u32_buffer(frame: &Frame) -> Result<Vec<u32>> {
    let pack = |r: u8, g: u8, b: u8| (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);

    let buffer = match to_image(frame) {
        FrameImage::Rgb(img) => img.pixels().map(|p| pack(p[0], p[1], p[2])).collect(),
        FrameImage::Gray(img) => img.pixels().map(|p| pack(p[0], p[0], p[0])).collect(),
        FrameImage::Depth(img) => img
            .pixels()
            .map(|p| {
                let z = p[0];
                if z > 0.0 && z.is_finite() {
                    let level = 255.0 * (1.0 - (z / DEPTH_DISPLAY_MAX_MM).min(1.0));
                    let v = level as u8;
                    pack(v, v, v)
                } else {
                    0
                }
            })
            .collect(),
        FrameImage::Invalid => {
            return Err(anyhow!("Cannot display {} frames", frame.format()));
        }
    };
    Ok(buffer)
}
