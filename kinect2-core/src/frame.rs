use std::fmt;
use std::ptr::NonNull;
use std::time::Duration;

use crate::error::{CameraError, Result};
use crate::pixel_format::FrameFormat;
use crate::time;

/// 帧来源的流类型，数值与驱动侧定义一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum FrameType {
    Color = 1,
    Ir = 2,
    Depth = 4,
}

impl FrameType {
    pub const ALL: [FrameType; 3] = [Self::Color, Self::Ir, Self::Depth];

    /// 该类型的帧由哪个 listener 槽位接收
    pub fn slot(&self) -> ListenerSlot {
        match self {
            Self::Color => ListenerSlot::Color,
            Self::Ir | Self::Depth => ListenerSlot::IrAndDepth,
        }
    }
}

/// 设备上的 listener 槽位：彩色流独占一个，IR 与深度共用一个
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerSlot {
    Color,
    IrAndDepth,
}

/// 帧级元数据
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameMetadata {
    /// 硬件时间戳，单位 1/8 毫秒 (30Hz 时每帧递增约 266)
    pub timestamp: u32,
    /// 单调递增的帧序号
    pub sequence: u32,
    /// 0.5 (很亮) 到 ~60.0 (完全遮挡)
    pub exposure: f32,
    /// 1.0 (亮) 到 1.5 (遮挡)
    pub gain: f32,
    /// 1.0 (亮) 到 6.4 (遮挡)
    pub gamma: f32,
    /// 0 表示正常，非 0 为驱动错误码
    pub status: u32,
}

/// 帧描述符：尺寸、格式与元数据，不含像素数据
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDescriptor {
    pub width: usize,
    pub height: usize,
    pub bytes_per_pixel: usize,
    pub format: FrameFormat,
    pub metadata: FrameMetadata,
}

impl FrameDescriptor {
    pub fn new(width: usize, height: usize, bytes_per_pixel: usize, format: FrameFormat) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
            format,
            metadata: FrameMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: FrameMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// `width * height * bytes_per_pixel`，溢出时返回 `None`
    pub fn data_len(&self) -> Option<usize> {
        self.width
            .checked_mul(self.height)?
            .checked_mul(self.bytes_per_pixel)
    }

    fn validate(&self, actual_len: usize) -> Result<()> {
        let expected = self.data_len().ok_or_else(|| {
            CameraError::InvalidFrame(format!(
                "{}x{}x{} overflows the address space",
                self.width, self.height, self.bytes_per_pixel
            ))
        })?;

        if expected != actual_len {
            return Err(CameraError::InvalidFrame(format!(
                "buffer holds {} bytes, {}x{} @ {} bytes per pixel needs {}",
                actual_len, self.width, self.height, self.bytes_per_pixel, expected
            )));
        }

        if let Some(bpp) = self.format.bytes_per_pixel() {
            if bpp != self.bytes_per_pixel {
                return Err(CameraError::InvalidFrame(format!(
                    "{} frames have {} bytes per pixel, got {}",
                    self.format, bpp, self.bytes_per_pixel
                )));
            }
        }

        Ok(())
    }
}

type ReleaseFn = Box<dyn FnOnce(NonNull<u8>, usize) + Send>;

/// 驱动分配的像素缓冲
///
/// 单一所有权：谁持有它，谁负责释放。`Drop` 时调用释放函数，且只调用一次。
/// 不可 Clone，跨线程移动 (move) 是唯一的所有权转移方式。
pub struct NativeBuffer {
    ptr: NonNull<u8>,
    len: usize,
    release: Option<ReleaseFn>,
}

impl NativeBuffer {
    /// 接管一块外部内存
    ///
    /// # Safety
    /// - `ptr` 必须指向至少 `len` 字节、已初始化的内存。
    /// - 在 `release` 被调用之前，这块内存不能被其他任何人访问或释放。
    pub unsafe fn from_raw_parts<F>(ptr: NonNull<u8>, len: usize, release: F) -> Self
    where
        F: FnOnce(NonNull<u8>, usize) + Send + 'static,
    {
        Self {
            ptr,
            len,
            release: Some(Box::new(release)),
        }
    }

    /// 接管一块由 C 堆 (`malloc`/`calloc`) 分配的内存，释放时调用 `free`
    ///
    /// # Safety
    /// 同 [`NativeBuffer::from_raw_parts`]，且 `ptr` 必须来自 libc 分配器。
    pub unsafe fn from_malloc(ptr: NonNull<u8>, len: usize) -> Self {
        Self::from_raw_parts(ptr, len, |p, _| libc::free(p.as_ptr().cast()))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: from_raw_parts 的调用方保证 ptr 在 release 前对 len 字节有效且独占
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.ptr, self.len);
        }
    }
}

// 独占所有权 + 只读访问，没有内部可变性
unsafe impl Send for NativeBuffer {}
unsafe impl Sync for NativeBuffer {}

impl fmt::Debug for NativeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// 驱动交给 listener 的原始帧：描述符 + 缓冲所有权
#[derive(Debug)]
pub struct RawFrame {
    pub descriptor: FrameDescriptor,
    pub buffer: NativeBuffer,
}

impl RawFrame {
    pub fn new(descriptor: FrameDescriptor, buffer: NativeBuffer) -> Self {
        Self { descriptor, buffer }
    }
}

enum FrameBuffer {
    Owned(Vec<u8>),
    Native(NativeBuffer),
}

impl FrameBuffer {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(data) => data,
            Self::Native(buffer) => buffer.as_slice(),
        }
    }
}

/// 单个像素的取值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PixelValue<'a> {
    /// 深度 (毫米) 或 IR 强度。<= 0 表示无效
    Float(f32),
    Rgb { r: u8, g: u8, b: u8 },
    Gray(u8),
    /// Raw/Bayer/Invalid 格式，返回该像素的原始字节
    Raw(&'a [u8]),
}

/// 核心帧结构体
///
/// 构造后不可变；像素缓冲只有一个所有者。由驱动产生的帧在 `Drop` 时
/// 把缓冲归还给驱动的释放函数，合成帧则持有普通的 `Vec<u8>`。
pub struct Frame {
    descriptor: FrameDescriptor,
    buffer: FrameBuffer,
}

impl Frame {
    /// 接管驱动交付的原始帧
    ///
    /// 校验失败时 `raw` 仍然被消费，缓冲在返回前释放。
    pub fn from_raw(raw: RawFrame) -> Result<Self> {
        raw.descriptor.validate(raw.buffer.len())?;
        Ok(Self {
            descriptor: raw.descriptor,
            buffer: FrameBuffer::Native(raw.buffer),
        })
    }

    /// 用已有数据构造合成帧 (测试与工具使用)
    pub fn from_vec(descriptor: FrameDescriptor, data: Vec<u8>) -> Result<Self> {
        descriptor.validate(data.len())?;
        Ok(Self {
            descriptor,
            buffer: FrameBuffer::Owned(data),
        })
    }

    /// 分配一个全零的帧
    pub fn alloc(width: usize, height: usize, format: FrameFormat) -> Result<Self> {
        let bpp = format.bytes_per_pixel().ok_or_else(|| {
            CameraError::InvalidFrame(format!("{} has no fixed pixel size", format))
        })?;
        let descriptor = FrameDescriptor::new(width, height, bpp, format);
        let len = descriptor
            .data_len()
            .ok_or_else(|| CameraError::InvalidFrame(format!("{}x{} is too large", width, height)))?;
        Self::from_vec(descriptor, vec![0; len])
    }

    /// 由 f32 深度值 (毫米) 构造 `Float` 帧
    pub fn from_depth(width: usize, height: usize, values: &[f32]) -> Result<Self> {
        let descriptor = FrameDescriptor::new(width, height, 4, FrameFormat::Float);
        Self::from_vec(descriptor, bytemuck::cast_slice(values).to_vec())
    }

    pub fn with_metadata(mut self, metadata: FrameMetadata) -> Self {
        self.descriptor.metadata = metadata;
        self
    }

    pub fn descriptor(&self) -> &FrameDescriptor {
        &self.descriptor
    }

    pub fn width(&self) -> usize {
        self.descriptor.width
    }

    pub fn height(&self) -> usize {
        self.descriptor.height
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.descriptor.bytes_per_pixel
    }

    pub fn format(&self) -> FrameFormat {
        self.descriptor.format
    }

    pub fn metadata(&self) -> &FrameMetadata {
        &self.descriptor.metadata
    }

    pub fn timestamp(&self) -> u32 {
        self.descriptor.metadata.timestamp
    }

    pub fn timestamp_as_duration(&self) -> Duration {
        time::ticks_to_duration(self.timestamp())
    }

    pub fn sequence(&self) -> u32 {
        self.descriptor.metadata.sequence
    }

    pub fn exposure(&self) -> f32 {
        self.descriptor.metadata.exposure
    }

    pub fn gain(&self) -> f32 {
        self.descriptor.metadata.gain
    }

    pub fn gamma(&self) -> f32 {
        self.descriptor.metadata.gamma
    }

    pub fn status(&self) -> u32 {
        self.descriptor.metadata.status
    }

    /// 行优先排列的像素数据，长度恒为 `width * height * bytes_per_pixel`
    pub fn data(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// 缓冲是否来自驱动 (而不是合成帧)
    pub fn is_native(&self) -> bool {
        matches!(self.buffer, FrameBuffer::Native(_))
    }

    /// 把 `Float` 帧解码为 f32 数组 (拷贝，不要求对齐)
    pub fn float_values(&self) -> Result<Vec<f32>> {
        if self.format() != FrameFormat::Float {
            return Err(CameraError::InvalidFrame(format!(
                "expected a Float frame, got {}",
                self.format()
            )));
        }
        Ok(bytemuck::pod_collect_to_vec(self.data()))
    }

    /// 读取 (x, y) 处的像素，越界返回 `None`
    pub fn pixel(&self, x: usize, y: usize) -> Option<PixelValue<'_>> {
        if x >= self.width() || y >= self.height() {
            return None;
        }

        let bpp = self.bytes_per_pixel();
        let index = (y * self.width() + x) * bpp;
        let px = self.data().get(index..index + bpp)?;
        Some(decode(self.format(), px))
    }

    /// 按行遍历像素，每一行是一个 [`PixelValue`] 迭代器
    ///
    /// ```
    /// # use kinect2_core::frame::{Frame, PixelValue};
    /// let frame = Frame::from_depth(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    /// let total: f32 = frame
    ///     .rows()
    ///     .flatten()
    ///     .map(|px| match px {
    ///         PixelValue::Float(z) => z,
    ///         _ => 0.0,
    ///     })
    ///     .sum();
    /// assert_eq!(total, 10.0);
    /// ```
    pub fn rows(&self) -> Rows<'_> {
        Rows { frame: self, y: 0 }
    }
}

fn decode(format: FrameFormat, px: &[u8]) -> PixelValue<'_> {
    match format {
        FrameFormat::Float if px.len() == 4 => PixelValue::Float(bytemuck::pod_read_unaligned(px)),
        FrameFormat::Gray => PixelValue::Gray(px[0]),
        fmt => match fmt.rgb_offsets() {
            Some([r, g, b]) => PixelValue::Rgb {
                r: px[r],
                g: px[g],
                b: px[b],
            },
            None => PixelValue::Raw(px),
        },
    }
}

/// [`Frame::rows`] 返回的行迭代器
#[derive(Debug, Clone)]
pub struct Rows<'a> {
    frame: &'a Frame,
    y: usize,
}

impl<'a> Iterator for Rows<'a> {
    type Item = RowPixels<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let frame: &'a Frame = self.frame;
        if self.y >= frame.height() {
            return None;
        }
        let row_len = frame.width() * frame.bytes_per_pixel();
        let start = self.y * row_len;
        self.y += 1;
        Some(RowPixels {
            format: frame.format(),
            bytes_per_pixel: frame.bytes_per_pixel(),
            data: &frame.data()[start..start + row_len],
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.frame.height().saturating_sub(self.y);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Rows<'_> {}

/// 一行内的像素迭代器
#[derive(Debug, Clone)]
pub struct RowPixels<'a> {
    format: FrameFormat,
    bytes_per_pixel: usize,
    data: &'a [u8],
}

impl<'a> Iterator for RowPixels<'a> {
    type Item = PixelValue<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() || self.bytes_per_pixel == 0 {
            return None;
        }
        let data: &'a [u8] = self.data;
        let (px, rest) = data.split_at(self.bytes_per_pixel);
        self.data = rest;
        Some(decode(self.format, px))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.data.len().checked_div(self.bytes_per_pixel).unwrap_or(0);
        (left, Some(left))
    }
}

impl ExactSizeIterator for RowPixels<'_> {}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("bytes_per_pixel", &self.bytes_per_pixel())
            .field("format", &self.format())
            .field("sequence", &self.sequence())
            .field("native", &self.is_native())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn leak_vec(data: Vec<u8>, released: Arc<AtomicUsize>) -> NativeBuffer {
        let mut data = std::mem::ManuallyDrop::new(data.into_boxed_slice());
        let len = data.len();
        let ptr = NonNull::new(data.as_mut_ptr()).unwrap();
        unsafe {
            NativeBuffer::from_raw_parts(ptr, len, move |p, len| {
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(p.as_ptr(), len)));
                released.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[test]
    fn native_frame_releases_buffer_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let raw = RawFrame::new(
            FrameDescriptor::new(1, 2, 2, FrameFormat::Raw),
            leak_vec(vec![1, 2, 3, 4], released.clone()),
        );

        let frame = Frame::from_raw(raw).unwrap();
        assert!(frame.is_native());
        assert_eq!(frame.data(), &[1, 2, 3, 4]);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        // move 到别的线程再释放
        std::thread::spawn(move || drop(frame)).join().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejected_raw_frame_is_still_released() {
        let released = Arc::new(AtomicUsize::new(0));
        let raw = RawFrame::new(
            FrameDescriptor::new(4, 4, 4, FrameFormat::Float),
            leak_vec(vec![0; 8], released.clone()),
        );

        assert!(matches!(Frame::from_raw(raw), Err(CameraError::InvalidFrame(_))));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fixed_size_formats_check_bytes_per_pixel() {
        let descriptor = FrameDescriptor::new(2, 1, 3, FrameFormat::Bgrx);
        assert!(Frame::from_vec(descriptor, vec![0; 6]).is_err());
    }

    #[test]
    fn pixel_reads_respect_channel_order() {
        let descriptor = FrameDescriptor::new(1, 1, 4, FrameFormat::Bgrx);
        let frame = Frame::from_vec(descriptor, vec![10, 20, 30, 0]).unwrap();
        assert_eq!(
            frame.pixel(0, 0),
            Some(PixelValue::Rgb {
                r: 30,
                g: 20,
                b: 10
            })
        );
        assert_eq!(frame.pixel(1, 0), None);
    }

    #[test]
    fn depth_frames_decode_to_floats() {
        let frame = Frame::from_depth(2, 1, &[500.0, 1250.5]).unwrap();
        assert_eq!(frame.float_values().unwrap(), vec![500.0, 1250.5]);
        assert_eq!(frame.pixel(1, 0), Some(PixelValue::Float(1250.5)));

        let gray = Frame::alloc(2, 1, FrameFormat::Gray).unwrap();
        assert!(gray.float_values().is_err());
    }

    #[test]
    fn rows_walk_bgrx_pixels_in_order() {
        let descriptor = FrameDescriptor::new(2, 2, 4, FrameFormat::Bgrx);
        let data = vec![1, 2, 3, 0, 4, 5, 6, 0, 7, 8, 9, 0, 10, 11, 12, 0];
        let frame = Frame::from_vec(descriptor, data).unwrap();

        let rows: Vec<Vec<PixelValue<'_>>> = frame.rows().map(|row| row.collect()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], PixelValue::Rgb { r: 6, g: 5, b: 4 });
        assert_eq!(rows[1][0], PixelValue::Rgb { r: 9, g: 8, b: 7 });
        assert_eq!(frame.rows().next().unwrap().len(), 2);
    }

    #[test]
    fn rows_decode_float_frames() {
        let frame = Frame::from_depth(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let second: Vec<_> = frame.rows().nth(1).unwrap().collect();
        assert_eq!(
            second,
            vec![
                PixelValue::Float(4.0),
                PixelValue::Float(5.0),
                PixelValue::Float(6.0)
            ]
        );
        assert_eq!(frame.rows().flatten().count(), 6);
        assert_eq!(frame.rows().flatten().nth(4), frame.pixel(1, 1));
    }

    #[test]
    fn malloc_buffers_are_freed_on_drop() {
        let len = 6;
        let ptr = NonNull::new(unsafe { libc::malloc(len) }.cast::<u8>()).unwrap();
        unsafe { std::ptr::copy_nonoverlapping([1u8, 2, 3, 4, 5, 6].as_ptr(), ptr.as_ptr(), len) };

        let buffer = unsafe { NativeBuffer::from_malloc(ptr, len) };
        let raw = RawFrame::new(FrameDescriptor::new(3, 1, 2, FrameFormat::Raw), buffer);
        let frame = Frame::from_raw(raw).unwrap();
        assert_eq!(frame.data(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(frame.pixel(2, 0), Some(PixelValue::Raw(&[5, 6])));
        drop(frame);
    }

    #[test]
    fn timestamp_uses_eighth_millisecond_ticks() {
        let frame = Frame::alloc(1, 1, FrameFormat::Gray)
            .unwrap()
            .with_metadata(FrameMetadata {
                timestamp: 800,
                ..Default::default()
            });
        assert_eq!(frame.timestamp_as_duration(), Duration::from_millis(100));
    }
}
