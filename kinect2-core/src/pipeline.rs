use std::fmt;

use cfg_if::cfg_if;

use crate::config::Config;
use crate::filter;

cfg_if! {
    // OpenCL 后端在 Linux 上不启用
    if #[cfg(all(feature = "opencl", not(target_os = "linux")))] {
        const OPENCL_AVAILABLE: bool = true;
    } else {
        const OPENCL_AVAILABLE: bool = false;
    }
}

cfg_if! {
    if #[cfg(feature = "opengl")] {
        const OPENGL_AVAILABLE: bool = true;
    } else {
        const OPENGL_AVAILABLE: bool = false;
    }
}

/// 深度解包/处理流水线的选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PacketPipeline {
    /// 纯 CPU 实现，总是可用
    #[default]
    Cpu,
    OpenCl,
    /// OpenCL + 核密度估计 (KDE) 相位解包
    OpenClKde,
    OpenGl,
}

impl PacketPipeline {
    pub const ALL: [PacketPipeline; 4] = [Self::Cpu, Self::OpenCl, Self::OpenClKde, Self::OpenGl];

    /// 该流水线是否编译进了当前构建
    pub fn is_available(&self) -> bool {
        match self {
            Self::Cpu => true,
            Self::OpenCl | Self::OpenClKde => OPENCL_AVAILABLE,
            Self::OpenGl => OPENGL_AVAILABLE,
        }
    }

    /// 不可用时确定性地回退到 `Cpu`
    pub fn resolve(self) -> PacketPipeline {
        if self.is_available() {
            self
        } else {
            tracing::warn!(requested = %self, "Pipeline not compiled in, falling back to CPU");
            Self::Cpu
        }
    }
}

impl fmt::Display for PacketPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cpu => "CPU",
            Self::OpenCl => "OpenCL",
            Self::OpenClKde => "OpenCL-KDE",
            Self::OpenGl => "OpenGL",
        };
        f.write_str(name)
    }
}

/// 深度处理后端
///
/// 由驱动构造，所有权随 `open` 转移给设备，在 capture 线程上调用。
pub trait ProcessingBackend: Send {
    fn kind(&self) -> PacketPipeline;

    /// 原地处理一帧深度 (毫米)，行优先
    fn process_depth(&mut self, depth: &mut [f32], width: usize, height: usize, config: &Config);
}

/// CPU 后端：深度范围裁剪 + 可选的平滑
#[derive(Debug, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessingBackend for CpuBackend {
    fn kind(&self) -> PacketPipeline {
        PacketPipeline::Cpu
    }

    fn process_depth(&mut self, depth: &mut [f32], width: usize, height: usize, config: &Config) {
        let (min_mm, max_mm) = config.depth_range_mm();
        for z in depth.iter_mut() {
            if !(*z >= min_mm && *z <= max_mm) {
                *z = 0.0;
            }
        }

        if config.enable_bilateral_filter {
            filter::bilateral(depth, width, height);
        }
        if config.enable_edge_aware_filter {
            filter::edge_aware(depth, width, height);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_is_always_available() {
        assert!(PacketPipeline::Cpu.is_available());
        assert_eq!(PacketPipeline::default().resolve(), PacketPipeline::Cpu);
    }

    #[test]
    fn resolve_never_returns_unavailable_pipeline() {
        for p in PacketPipeline::ALL {
            let resolved = p.resolve();
            assert!(resolved.is_available());
            if !p.is_available() {
                assert_eq!(resolved, PacketPipeline::Cpu);
            }
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn opencl_is_never_available_on_linux() {
        assert!(!PacketPipeline::OpenCl.is_available());
        assert!(!PacketPipeline::OpenClKde.is_available());
    }

    #[test]
    fn cpu_backend_clips_to_depth_range() {
        let config = Config::new()
            .depth_range(0.5, 4.5)
            .bilateral_filter(false)
            .edge_aware_filter(false);
        let mut depth = vec![100.0, 500.0, 2000.0, 4500.0, 5000.0, f32::NAN];
        CpuBackend::new().process_depth(&mut depth, 6, 1, &config);
        assert_eq!(depth, vec![0.0, 500.0, 2000.0, 4500.0, 0.0, 0.0]);
    }
}
