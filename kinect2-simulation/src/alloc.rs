use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kinect2_core::frame::NativeBuffer;

/// 分配计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    pub allocated: usize,
    pub released: usize,
}

impl AllocationStats {
    /// 尚未归还的缓冲数量
    pub fn outstanding(&self) -> usize {
        self.allocated.saturating_sub(self.released)
    }
}

#[derive(Debug, Default)]
struct Counters {
    allocated: AtomicUsize,
    released: AtomicUsize,
}

/// C 堆帧缓冲分配器
///
/// 每个缓冲由 `malloc` 分配，随 [`NativeBuffer`] 的 `Drop` 调用 `free`，
/// 同时记录分配与释放次数，供所有权测试检查 "恰好释放一次"。
#[derive(Debug, Clone, Default)]
pub struct NativeAllocator {
    counters: Arc<Counters>,
}

impl NativeAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配一块缓冲并拷入 `bytes`；`malloc` 失败时返回 `None`
    pub fn alloc_copy(&self, bytes: &[u8]) -> Option<NativeBuffer> {
        let len = bytes.len();
        // malloc(0) 可能返回空指针，至少分配 1 字节
        // SAFETY: 只申请内存，不做其他假设
        let raw = unsafe { libc::malloc(len.max(1)) }.cast::<u8>();
        let ptr = NonNull::new(raw)?;

        // SAFETY: ptr 指向至少 len 字节的新内存，与 bytes 不重叠
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), len) };

        self.counters.allocated.fetch_add(1, Ordering::SeqCst);
        let counters = Arc::clone(&self.counters);

        // SAFETY: 内存已初始化，且此后只能通过返回的 NativeBuffer 访问
        let buffer = unsafe {
            NativeBuffer::from_raw_parts(ptr, len, move |p, _| {
                libc::free(p.as_ptr().cast());
                counters.released.fetch_add(1, Ordering::SeqCst);
            })
        };
        Some(buffer)
    }

    pub fn stats(&self) -> AllocationStats {
        AllocationStats {
            allocated: self.counters.allocated.load(Ordering::SeqCst),
            released: self.counters.released.load(Ordering::SeqCst),
        }
    }
}
