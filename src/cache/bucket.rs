//! 桶索引：分桶的槽位成员关系与元数据
//!
//! 索引把查找键 `(dev, blockno)` 映射到当前缓存该块的槽位。它由固定数量
//! 的桶组成，每个桶持有一把短临界区自旋锁和一条循环双向链表；链表的
//! 链接是槽位下标而非裸指针（槽位本身存放在固定数组里，永不移动）。
//! 任意时刻每个槽位恰好属于一个桶；跨桶驱逐会把槽位从一个桶迁移到另一个。
//!
//! # 元数据保护约定
//!
//! 槽位元数据（[`SlotMeta`]：身份、引用计数、链接）存放在 `UnsafeCell`
//! 数组中，锁并不"拥有"它们。安全性依赖以下纪律，仅限本 crate 内部遵守：
//!
//! 1. 访问槽位 `i` 的元数据时，必须持有当前包含 `i` 的那个桶的锁
//!    （通过 [`BucketGuard`] 的方法体现）；
//! 2. 例外：线程已在某个桶锁下 `unlink` 了槽位 `i` 且尚未把它插入
//!    其他桶——此时该槽位游离，被该线程独占，可在持有目标桶锁时
//!    用 [`BucketGuard::push_front`] 接入。
//!
//! 引用计数的所有变迁都发生在规则 1 之下，因此
//! `ref_count == 0` 在桶锁下观察到即稳定，可安全改派。

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use spin::{Mutex, MutexGuard};

/// 身份哨兵：槽位当前不持有任何块
///
/// 初始化时以及驱逐竞争失败后被降级的槽位使用该值；命中查找
/// 跳过带哨兵身份的槽位，因此它们对任何查找键（包括设备号
/// 恰为 `u32::MAX` 的合法键）都不构成命中。
pub(crate) const NO_DEV: u32 = u32::MAX;

/// 链接哨兵：指向桶的表头
const HEAD: usize = usize::MAX;

/// 槽位元数据，由包含该槽位的桶的索引锁保护
pub(crate) struct SlotMeta {
    /// 设备标识（`NO_DEV` 表示无身份）
    pub dev: u32,
    /// 块号
    pub blockno: u64,
    /// 当前持有者数量（含 pin）；为 0 时槽位可被改派
    pub refcnt: u32,
    /// 桶内后继（槽位下标，`HEAD` 表示表头）
    next: usize,
    /// 桶内前驱
    prev: usize,
}

/// 桶的表头哨兵节点
pub(crate) struct BucketHead {
    next: usize,
    prev: usize,
}

/// 桶索引
pub(crate) struct BucketIndex {
    buckets: Box<[Mutex<BucketHead>]>,
    meta: Box<[UnsafeCell<SlotMeta>]>,
}

// SAFETY: meta 的访问遵守模块级保护约定（桶锁或游离独占），
// 不存在无同步的并发访问。
unsafe impl Sync for BucketIndex {}

impl BucketIndex {
    /// 创建索引：`capacity` 个槽位全部挂入 0 号桶，身份为哨兵值
    pub fn new(bucket_count: usize, capacity: usize) -> Self {
        assert!(bucket_count > 0, "bucket_count must be > 0");
        assert!(capacity > 0, "capacity must be > 0");

        let meta: Vec<UnsafeCell<SlotMeta>> = (0..capacity)
            .map(|i| {
                UnsafeCell::new(SlotMeta {
                    dev: NO_DEV,
                    blockno: 0,
                    refcnt: 0,
                    next: if i + 1 < capacity { i + 1 } else { HEAD },
                    prev: if i > 0 { i - 1 } else { HEAD },
                })
            })
            .collect();

        let buckets: Vec<Mutex<BucketHead>> = (0..bucket_count)
            .map(|b| {
                if b == 0 {
                    Mutex::new(BucketHead {
                        next: 0,
                        prev: capacity - 1,
                    })
                } else {
                    Mutex::new(BucketHead {
                        next: HEAD,
                        prev: HEAD,
                    })
                }
            })
            .collect();

        Self {
            buckets: buckets.into_boxed_slice(),
            meta: meta.into_boxed_slice(),
        }
    }

    /// 桶数量
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// 某个桶的索引锁当前是否被持有
    #[cfg(test)]
    pub fn is_locked(&self, bucket: usize) -> bool {
        self.buckets[bucket].is_locked()
    }

    /// 键的归属桶号
    pub fn bucket_of(&self, blockno: u64) -> usize {
        (blockno % self.buckets.len() as u64) as usize
    }

    /// 锁住一个桶，返回其成员操作句柄
    pub fn lock(&self, bucket: usize) -> BucketGuard<'_> {
        BucketGuard {
            index: self,
            head: self.buckets[bucket].lock(),
        }
    }
}

/// 已锁桶的成员操作句柄
///
/// 存活期间持有桶的索引锁；所有元数据访问都经由它进行，
/// 从而满足模块级保护约定。
pub(crate) struct BucketGuard<'a> {
    index: &'a BucketIndex,
    head: MutexGuard<'a, BucketHead>,
}

impl<'a> BucketGuard<'a> {
    /// 读取槽位元数据
    ///
    /// 槽位必须属于本桶，或为本线程游离独占（见模块级约定）。
    pub fn meta(&self, slot: usize) -> &SlotMeta {
        // SAFETY: 持有桶锁，且调用方遵守模块级保护约定。
        unsafe { &*self.index.meta[slot].get() }
    }

    /// 可变访问槽位元数据（约定同 [`Self::meta`]）
    pub fn meta_mut(&mut self, slot: usize) -> &mut SlotMeta {
        // SAFETY: 持有桶锁，且调用方遵守模块级保护约定；
        // &mut self 排除了经由同一 guard 的别名。
        unsafe { &mut *self.index.meta[slot].get() }
    }

    /// 命中查找：从表头起扫描身份等于 `(dev, blockno)` 的槽位
    ///
    /// 无身份槽位（`dev == NO_DEV`）被跳过：即使查找键的设备号
    /// 恰为哨兵值，也只能经由改派路径绑定槽位，不构成命中。
    pub fn find(&self, dev: u32, blockno: u64) -> Option<usize> {
        let mut cur = self.head.next;
        while cur != HEAD {
            let m = self.meta(cur);
            if m.dev != NO_DEV && m.dev == dev && m.blockno == blockno {
                return Some(cur);
            }
            cur = m.next;
        }
        None
    }

    /// 空闲查找：从表头起扫描第一个 `refcnt == 0` 的槽位
    pub fn find_free(&self) -> Option<usize> {
        let mut cur = self.head.next;
        while cur != HEAD {
            let m = self.meta(cur);
            if m.refcnt == 0 {
                return Some(cur);
            }
            cur = m.next;
        }
        None
    }

    /// 驱逐查找：从表尾（真正的最久未用端）起扫描第一个 `refcnt == 0` 的槽位
    pub fn find_free_from_tail(&self) -> Option<usize> {
        let mut cur = self.head.prev;
        while cur != HEAD {
            let m = self.meta(cur);
            if m.refcnt == 0 {
                return Some(cur);
            }
            cur = m.prev;
        }
        None
    }

    /// 把槽位从本桶链表摘下（之后槽位游离，由调用线程独占）
    pub fn unlink(&mut self, slot: usize) {
        let (p, n) = {
            let m = self.meta(slot);
            (m.prev, m.next)
        };
        self.set_next(p, n);
        self.set_prev(n, p);
    }

    /// 把游离槽位插入本桶表头（最近使用端）
    pub fn push_front(&mut self, slot: usize) {
        let first = self.head.next;
        {
            let m = self.meta_mut(slot);
            m.prev = HEAD;
            m.next = first;
        }
        self.set_prev(first, slot);
        self.head.next = slot;
    }

    /// 把本桶内的槽位移到表头（标记最近使用）
    pub fn move_to_front(&mut self, slot: usize) {
        if self.head.next == slot {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    /// 本桶成员数量
    #[cfg(test)]
    pub fn len(&self) -> usize {
        let mut n = 0;
        let mut cur = self.head.next;
        while cur != HEAD {
            n += 1;
            cur = self.meta(cur).next;
        }
        n
    }

    fn set_next(&mut self, node: usize, value: usize) {
        if node == HEAD {
            self.head.next = value;
        } else {
            self.meta_mut(node).next = value;
        }
    }

    fn set_prev(&mut self, node: usize, value: usize) {
        if node == HEAD {
            self.head.prev = value;
        } else {
            self.meta_mut(node).prev = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_all_slots_in_bucket_zero() {
        let index = BucketIndex::new(13, 30);
        assert_eq!(index.lock(0).len(), 30);
        for b in 1..13 {
            assert_eq!(index.lock(b).len(), 0);
        }
    }

    #[test]
    fn test_bucket_of() {
        let index = BucketIndex::new(13, 4);
        assert_eq!(index.bucket_of(0), 0);
        assert_eq!(index.bucket_of(13), 0);
        assert_eq!(index.bucket_of(5), 5);
        assert_eq!(index.bucket_of(27), 1);
    }

    #[test]
    fn test_find_by_identity() {
        let index = BucketIndex::new(2, 4);
        let mut guard = index.lock(0);
        assert_eq!(guard.find(0, 42), None);

        let slot = guard.find_free().unwrap();
        {
            let m = guard.meta_mut(slot);
            m.dev = 0;
            m.blockno = 42;
            m.refcnt = 1;
        }
        assert_eq!(guard.find(0, 42), Some(slot));
        assert_eq!(guard.find(1, 42), None);
    }

    #[test]
    fn test_find_skips_identityless_slots() {
        let index = BucketIndex::new(2, 4);
        let guard = index.lock(0);

        // 初始槽位身份为 (NO_DEV, 0)；设备号恰为哨兵值的合法键不得命中
        assert_eq!(guard.find(u32::MAX, 0), None);
        assert_eq!(guard.find(NO_DEV, 0), None);
    }

    #[test]
    fn test_migration_preserves_total_membership() {
        let index = BucketIndex::new(2, 4);

        // 从 0 号桶表尾摘一个槽位，迁入 1 号桶
        let slot = {
            let mut guard = index.lock(0);
            let slot = guard.find_free_from_tail().unwrap();
            guard.unlink(slot);
            slot
        };
        {
            let mut guard = index.lock(1);
            guard.push_front(slot);
        }

        assert_eq!(index.lock(0).len(), 3);
        assert_eq!(index.lock(1).len(), 1);
        assert_eq!(index.lock(0).len() + index.lock(1).len(), 4);
    }

    #[test]
    fn test_move_to_front_reorders() {
        let index = BucketIndex::new(1, 3);
        let mut guard = index.lock(0);

        // 初始链为 0 -> 1 -> 2；表尾端的空闲查找应返回 2
        assert_eq!(guard.find_free_from_tail(), Some(2));

        guard.move_to_front(2);
        // 现在 2 是表头，表尾是 1
        assert_eq!(guard.find_free_from_tail(), Some(1));
        assert_eq!(guard.find_free(), Some(2));
        assert_eq!(guard.len(), 3);
    }

    #[test]
    fn test_tail_scan_skips_referenced() {
        let index = BucketIndex::new(1, 3);
        let mut guard = index.lock(0);

        // 链为 0 -> 1 -> 2；把表尾的 2 标为被引用
        guard.meta_mut(2).refcnt = 1;
        assert_eq!(guard.find_free_from_tail(), Some(1));

        guard.meta_mut(1).refcnt = 1;
        guard.meta_mut(0).refcnt = 1;
        assert_eq!(guard.find_free_from_tail(), None);
        assert_eq!(guard.find_free(), None);
    }

    #[test]
    fn test_unlink_single_element_bucket() {
        let index = BucketIndex::new(2, 1);
        {
            let mut guard = index.lock(0);
            guard.unlink(0);
            assert_eq!(guard.len(), 0);
        }
        {
            let mut guard = index.lock(1);
            guard.push_front(0);
            assert_eq!(guard.len(), 1);
            assert_eq!(guard.find_free(), Some(0));
        }
    }
}
