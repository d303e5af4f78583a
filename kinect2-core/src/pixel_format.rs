use std::fmt::{self, Display};

/// 帧像素格式 (封闭集合)
///
/// 数值与驱动侧的格式编号一一对应，便于在 FFI 边界直接转换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum FrameFormat {
    /// 无效格式
    #[default]
    Invalid = 0,
    /// 原始码流，每像素字节数由帧自身的 `bytes_per_pixel` 决定
    Raw = 1,
    /// 每像素一个 4 字节 float (深度: 毫米; IR: 强度)
    Float = 2,
    /// 每像素 4 字节: B, G, R, 未使用
    Bgrx = 4,
    /// 每像素 4 字节: R, G, B, 未使用
    Rgbx = 5,
    /// 每像素 1 字节灰度
    Gray = 6,
    /// 每像素 3 字节: R, G, B
    Rgb = 7,
    /// 每像素 3 字节: B, G, R
    Bgr = 8,

    // --- Bayer Formats (Raw Sensor Data) ---
    BayerRggb = 16,
    BayerBggr = 17,
    BayerGrbg = 18,
    BayerGbrg = 19,
}

impl FrameFormat {
    /// 所有格式，按编号排列
    pub const ALL: [FrameFormat; 12] = [
        Self::Invalid,
        Self::Raw,
        Self::Float,
        Self::Bgrx,
        Self::Rgbx,
        Self::Gray,
        Self::Rgb,
        Self::Bgr,
        Self::BayerRggb,
        Self::BayerBggr,
        Self::BayerGrbg,
        Self::BayerGbrg,
    ];

    /// 该格式固定的每像素字节数
    ///
    /// `Raw` 与 `Invalid` 没有固定值，返回 `None`。
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            Self::Float | Self::Bgrx | Self::Rgbx => Some(4),
            Self::Rgb | Self::Bgr => Some(3),
            Self::Gray => Some(1),
            // Bayer 8-bit
            Self::BayerRggb | Self::BayerBggr | Self::BayerGrbg | Self::BayerGbrg => Some(1),
            Self::Raw | Self::Invalid => None,
        }
    }

    /// 判断是否为 Bayer 原始格式 (需要 Demosaic)
    pub fn is_bayer(&self) -> bool {
        matches!(
            self,
            Self::BayerRggb | Self::BayerBggr | Self::BayerGrbg | Self::BayerGbrg
        )
    }

    /// 是否为可直接显示的彩色格式
    pub fn is_color(&self) -> bool {
        matches!(self, Self::Rgb | Self::Bgr | Self::Rgbx | Self::Bgrx)
    }

    /// 彩色格式中 R/G/B 三个通道的字节偏移
    pub fn rgb_offsets(&self) -> Option<[usize; 3]> {
        match self {
            Self::Rgb | Self::Rgbx => Some([0, 1, 2]),
            Self::Bgr | Self::Bgrx => Some([2, 1, 0]),
            _ => None,
        }
    }
}

impl TryFrom<u8> for FrameFormat {
    type Error = u8;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|fmt| *fmt as u8 == val)
            .ok_or(val)
    }
}

impl Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invalid => "Invalid",
            Self::Raw => "Raw",
            Self::Float => "Float",
            Self::Bgrx => "BGRX",
            Self::Rgbx => "RGBX",
            Self::Gray => "Gray",
            Self::Rgb => "RGB",
            Self::Bgr => "BGR",
            Self::BayerRggb => "BayerRGGB",
            Self::BayerBggr => "BayerBGGR",
            Self::BayerGrbg => "BayerGRBG",
            Self::BayerGbrg => "BayerGBRG",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_round_trip() {
        for fmt in FrameFormat::ALL {
            assert_eq!(FrameFormat::try_from(fmt as u8), Ok(fmt));
        }
        assert_eq!(FrameFormat::try_from(3), Err(3));
    }

    #[test]
    fn bayer_formats_are_single_byte() {
        for fmt in FrameFormat::ALL.iter().filter(|f| f.is_bayer()) {
            assert_eq!(fmt.bytes_per_pixel(), Some(1));
            assert!(!fmt.is_color());
        }
        assert_eq!(FrameFormat::Raw.bytes_per_pixel(), None);
    }

    #[test]
    fn bgrx_swaps_red_and_blue() {
        assert_eq!(FrameFormat::Bgrx.rgb_offsets(), Some([2, 1, 0]));
        assert_eq!(FrameFormat::Rgbx.rgb_offsets(), Some([0, 1, 2]));
        assert_eq!(FrameFormat::Float.rgb_offsets(), None);
    }
}
