//! 睡眠锁（内容锁）
//!
//! 一次最多允许一个持有者独占访问被保护数据的互斥锁。与桶索引自旋锁不同，
//! 它可以被长时间持有（跨越磁盘 I/O 与调用方对载荷的整个使用期），
//! 并且锁的持有期不与任何借用作用域绑定：获取与释放是显式操作，
//! 可以发生在不同的函数里。
//!
//! 本库没有自己的调度器，因此"挂起"由宿主环境决定：在 std / 测试环境下
//! 等待者让出线程；在裸机环境下退化为自旋等待（宿主内核可在其之上
//! 封装真正的睡眠语义）。
//!
//! `release` 使用 Release 序存储，`acquire` 使用 Acquire 序读取，
//! 因此释放者对数据的全部写入对下一个获取者可见。

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

/// 睡眠锁
///
/// # 示例
///
/// ```rust,ignore
/// let lock = SleepLock::new(0u32);
/// lock.acquire();
/// // SAFETY: 当前线程持有锁
/// unsafe { *lock.as_ptr() += 1 };
/// lock.release();
/// ```
pub struct SleepLock<T: ?Sized> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: 锁协议保证任意时刻至多一个线程访问 data。
unsafe impl<T: ?Sized + Send> Sync for SleepLock<T> {}
unsafe impl<T: ?Sized + Send> Send for SleepLock<T> {}

impl<T> SleepLock<T> {
    /// 创建新的睡眠锁，初始未被持有
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SleepLock<T> {
    /// 获取锁，必要时等待直到可用
    ///
    /// 没有超时或放弃路径：调用方无条件等待。
    pub fn acquire(&self) {
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            while self.locked.load(Ordering::Relaxed) {
                relax();
            }
        }
    }

    /// 释放锁，唤醒下一个等待者
    ///
    /// 只能由当前持有者调用。
    pub fn release(&self) {
        debug_assert!(self.holding(), "SleepLock::release: not held");
        self.locked.store(false, Ordering::Release);
    }

    /// 锁当前是否被持有
    ///
    /// 注意：只回答"是否有人持有"，不区分持有者是谁。
    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// 获取被保护数据的裸指针
    ///
    /// 解引用该指针要求调用方持有锁（或以其他方式保证独占，
    /// 例如槽位 `ref_count == 0` 且持有其桶索引锁）。
    pub fn as_ptr(&self) -> *mut T {
        self.data.get()
    }
}

#[cfg(any(test, feature = "std"))]
fn relax() {
    std::thread::yield_now();
}

#[cfg(not(any(test, feature = "std")))]
fn relax() {
    core::hint::spin_loop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_release() {
        let lock = SleepLock::new(7u32);
        assert!(!lock.holding());

        lock.acquire();
        assert!(lock.holding());
        // SAFETY: 本线程持有锁
        unsafe { *lock.as_ptr() = 8 };
        lock.release();
        assert!(!lock.holding());

        lock.acquire();
        // SAFETY: 本线程持有锁
        assert_eq!(unsafe { *lock.as_ptr() }, 8);
        lock.release();
    }

    #[test]
    fn test_mutual_exclusion() {
        const THREADS: usize = 4;
        const ITERS: usize = 1000;

        let lock = Arc::new(SleepLock::new(0u64));
        let mut handles = std::vec::Vec::new();
        for _ in 0..THREADS {
            let lock = lock.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..ITERS {
                    lock.acquire();
                    // SAFETY: 本线程持有锁
                    unsafe {
                        let p = lock.as_ptr();
                        let v = *p;
                        *p = v + 1;
                    }
                    lock.release();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        lock.acquire();
        // SAFETY: 本线程持有锁
        assert_eq!(unsafe { *lock.as_ptr() }, (THREADS * ITERS) as u64);
        lock.release();
    }
}
