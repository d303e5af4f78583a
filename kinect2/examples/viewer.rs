// kinect2/examples/viewer.rs
//
// cargo run -p kinect2 --example viewer --features highgui

use anyhow::Result;
use kinect2::{highgui, prelude::*};
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 1. 打开默认设备
    let mut manager = DeviceManager::new()?;
    if manager.enumerate_devices() == 0 {
        eprintln!("Error: no device connected");
        return Ok(());
    }
    let serial = manager.get_default_device_serial_number()?;
    println!("Opening {}...", serial);
    let mut device = manager.open_device_by_serial(&serial)?;
    println!("Firmware: {}", device.firmware_version());

    // 2. 同一个缓冲 listener 挂到两个槽位上
    let frames = MultiFrameListener::new(&[FrameType::Color, FrameType::Depth]);
    device.set_color_frame_listener(Some(frames.listener()));
    device.set_ir_and_depth_frame_listener(Some(frames.listener()));
    device.start()?;

    let registration = device.get_registration()?;
    let mut filter = true;

    // FPS 计算器
    let mut last_time = Instant::now();
    let mut frame_count = 0;

    println!("Start capturing... Press ESC or Q to exit, SPACE toggles filtering.");

    // 3. 主循环
    loop {
        let mut set = match frames.get_frames_with_timeout(Duration::from_secs(2)) {
            Ok(set) => set,
            Err(CameraError::Timeout) => {
                eprintln!("Warning: no frames within 2s");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let color = set.expect_frame(FrameType::Color)?;
        let depth = set.expect_frame(FrameType::Depth)?;

        let (undistorted, registered) = registration.apply_depth_to_color(&depth, &color, filter)?;

        highgui::imshow("Kinect2 Color", &color)?;
        highgui::imshow("Kinect2 Depth", &undistorted)?;
        highgui::imshow("Kinect2 Registered", &registered)?;

        frame_count += 1;
        if frame_count % 30 == 0 {
            let fps = 30.0 / last_time.elapsed().as_secs_f64();
            last_time = Instant::now();
            println!("FPS: {:.1}  {:?}", fps, device.telemetry());
        }

        // --- 按键控制 ---
        let key = highgui::wait_key(1);
        if key == 27 || key == 113 {
            println!("Exiting...");
            break;
        }
        if key == 32 {
            filter = !filter;
            println!("Registration filter: {}", if filter { "on" } else { "off" });
        }
    }

    // 4. 清理
    device.stop()?;
    device.close()?;
    highgui::destroy_all_windows();

    Ok(())
}
