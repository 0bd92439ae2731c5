//! 缓存管理器与公共协议
//!
//! [`BufCache`] 是进程全局的缓存对象：持有设备、槽位池与桶索引，
//! 对外暴露 fetch / unpin，经由 [`BlockHandle`] 暴露
//! flush / release / pin。
//!
//! # 获取算法（`acquire_slot`）
//!
//! 设归属桶 `home = blockno mod bucket_count`：
//!
//! 1. 锁 `home`，做命中查找；命中则递增引用计数，放开索引锁后
//!    获取内容锁（可能在此挂起等待当前持有者）。这是快路径。
//! 2. 未命中则在 `home` 内找 `refcnt == 0` 的槽位改派，移到表头。
//! 3. 仍没有则从 `home + 1` 起循环遍历其他桶，在各桶表尾
//!    （最久未用端）找空闲槽位窃取，迁入 `home` 表头。
//!    桶锁严格按桶号升序获取：候选桶号回绕到小于 `home` 时，
//!    先放开 `home` 的锁再锁候选桶，摘下牺牲槽位后重新锁 `home`
//!    并重做命中检查（竞争失败则降级牺牲槽位、改走命中路径）。
//! 4. 所有桶都没有空闲槽位时返回 [`ErrorKind::Exhausted`]。
//!
//! # 锁的持有规则
//!
//! 索引锁只保护链表与元数据，绝不跨设备 I/O 或内容锁等待持有；
//! 设备调用只发生在持有内容锁、未持有任何索引锁时。

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::block::BlockDevice;
use crate::consts::{DEFAULT_BUCKET_COUNT, DEFAULT_POOL_CAPACITY};
use crate::error::{Error, ErrorKind, Result};
use crate::sync::SleepLock;

use super::bucket::{BucketGuard, BucketIndex, NO_DEV};
use super::slot::{SlotData, SlotFlags};

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 驱逐次数（改派一个曾缓存过其他块的槽位）
    pub evictions: u64,
    /// flush 写回次数
    pub writebacks: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    writebacks: AtomicU64,
}

/// 块缓冲缓存
///
/// 在启动时构造一次，之后以共享引用传给所有调用方；
/// 内部没有任何隐藏的全局状态。
pub struct BufCache<D: BlockDevice> {
    device: D,
    index: BucketIndex,
    slots: Box<[SleepLock<SlotData>]>,
    block_size: usize,
    counters: Counters,
}

impl<D: BlockDevice> BufCache<D> {
    /// 以默认容量与桶数创建缓存
    ///
    /// 块大小取自设备。
    pub fn new(device: D) -> Self {
        Self::with_config(device, DEFAULT_POOL_CAPACITY, DEFAULT_BUCKET_COUNT)
    }

    /// 以显式容量与桶数创建缓存
    ///
    /// # 参数
    ///
    /// * `device` - 底层块设备
    /// * `capacity` - 槽位总数（必须 > 0）
    /// * `bucket_count` - 桶数量（必须 > 0）
    ///
    /// 初始化把每个槽位都挂入 0 号桶，保证任何操作开始前
    /// 所有槽位都能从索引到达。
    pub fn with_config(device: D, capacity: usize, bucket_count: usize) -> Self {
        let block_size = device.block_size();
        assert!(block_size > 0, "device block_size must be > 0");

        let slots: Vec<SleepLock<SlotData>> = (0..capacity)
            .map(|_| SleepLock::new(SlotData::new(block_size)))
            .collect();

        log::debug!(
            "[BCACHE] init capacity={} buckets={} block_size={}",
            capacity,
            bucket_count,
            block_size
        );

        Self {
            device,
            index: BucketIndex::new(bucket_count, capacity),
            slots: slots.into_boxed_slice(),
            block_size,
            counters: Counters::default(),
        }
    }

    /// 槽位池容量
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 桶数量
    pub fn bucket_count(&self) -> usize {
        self.index.bucket_count()
    }

    /// 块大小（字节）
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            writebacks: self.counters.writebacks.load(Ordering::Relaxed),
        }
    }

    /// 获取一个块（读穿透）
    ///
    /// 定位或分配 `(dev, blockno)` 的槽位并独占锁住；若载荷尚未反映
    /// 磁盘内容，则同步调用设备读入。返回的句柄持有内容锁，
    /// 直到 [`BlockHandle::release`] 或句柄被 drop。
    ///
    /// # 错误
    ///
    /// - [`ErrorKind::Exhausted`] - 所有桶中都没有 `ref_count == 0` 的
    ///   槽位。不可恢复：在不释放其他块的情况下重试不可能成功。
    /// - [`ErrorKind::Io`] 等 - 设备读取失败时原样上传；此时槽位已被
    ///   释放（仍标记为未填充，可被改派）。
    pub fn fetch(&self, dev: u32, blockno: u64) -> Result<BlockHandle<'_, D>> {
        let slot = self.acquire_slot(dev, blockno)?;
        let mut handle = BlockHandle {
            cache: self,
            slot,
            dev,
            blockno,
            released: false,
        };
        handle.populate()?;
        Ok(handle)
    }

    /// 解除一次 pin
    ///
    /// 与 [`BlockHandle::pin`] 配对，在归属桶索引锁下递减引用计数，
    /// 不触碰内容锁，也不调整链表位置。
    ///
    /// # 错误
    ///
    /// [`ErrorKind::InvalidState`] - 该块当前没有未配对的 pin/fetch。
    /// 表示调用方协议缺陷，不应捕获后继续。
    pub fn unpin(&self, dev: u32, blockno: u64) -> Result<()> {
        let mut guard = self.index.lock(self.index.bucket_of(blockno));
        match guard.find(dev, blockno) {
            Some(slot) if guard.meta(slot).refcnt > 0 => {
                guard.meta_mut(slot).refcnt -= 1;
                drop(guard);
                log::trace!("[BCACHE] unpin dev={} blockno={}", dev, blockno);
                Ok(())
            }
            _ => Err(Error::new(
                ErrorKind::InvalidState,
                "unpin of block that is not pinned",
            )),
        }
    }

    /// 核心分配算法，返回已持有内容锁的槽位下标
    fn acquire_slot(&self, dev: u32, blockno: u64) -> Result<usize> {
        let home_idx = self.index.bucket_of(blockno);
        let nbuckets = self.index.bucket_count();

        let mut home = self.index.lock(home_idx);

        // 命中查找
        if let Some(slot) = home.find(dev, blockno) {
            home.meta_mut(slot).refcnt += 1;
            drop(home);
            return Ok(self.lock_hit(slot, dev, blockno));
        }

        // 本桶空闲查找
        if let Some(slot) = home.find_free() {
            self.claim(&mut home, slot, dev, blockno);
            home.move_to_front(slot);
            drop(home);
            return Ok(self.lock_claimed(slot, dev, blockno));
        }

        // 跨桶驱逐：桶锁按桶号升序获取。
        // 升序段：候选桶号大于归属桶号，归属桶锁保持持有
        for c in home_idx + 1..nbuckets {
            let mut cand = self.index.lock(c);
            if let Some(victim) = cand.find_free_from_tail() {
                cand.unlink(victim);
                self.claim(&mut cand, victim, dev, blockno);
                drop(cand);
                home.push_front(victim);
                drop(home);
                log::debug!(
                    "[BCACHE] steal slot={} bucket {} -> {} for dev={} blockno={}",
                    victim,
                    c,
                    home_idx,
                    dev,
                    blockno
                );
                return Ok(self.lock_claimed(victim, dev, blockno));
            }
        }
        drop(home);

        // 回绕段：候选桶号小于归属桶号，归属桶锁已放开以维持升序
        for c in 0..home_idx {
            let mut cand = self.index.lock(c);
            match cand.find_free_from_tail() {
                Some(victim) => {
                    cand.unlink(victim);
                    self.claim(&mut cand, victim, dev, blockno);
                    drop(cand);

                    // 归属桶锁曾被放开：重做命中检查
                    let mut h = self.index.lock(home_idx);
                    if let Some(existing) = h.find(dev, blockno) {
                        // 竞争失败：他人已缓存该块。牺牲槽位降级为
                        // 无身份空闲槽挂回归属桶，改走命中路径。
                        {
                            let m = h.meta_mut(victim);
                            m.dev = NO_DEV;
                            m.blockno = 0;
                            m.refcnt = 0;
                        }
                        h.push_front(victim);
                        h.meta_mut(existing).refcnt += 1;
                        drop(h);
                        return Ok(self.lock_hit(existing, dev, blockno));
                    }
                    h.push_front(victim);
                    drop(h);
                    log::debug!(
                        "[BCACHE] steal slot={} bucket {} -> {} for dev={} blockno={}",
                        victim,
                        c,
                        home_idx,
                        dev,
                        blockno
                    );
                    return Ok(self.lock_claimed(victim, dev, blockno));
                }
                None => {
                    drop(cand);
                    // 重新锁归属桶；期间他人可能已缓存该块，
                    // 也可能有槽位被释放回本桶
                    let mut h = self.index.lock(home_idx);
                    if let Some(slot) = h.find(dev, blockno) {
                        h.meta_mut(slot).refcnt += 1;
                        drop(h);
                        return Ok(self.lock_hit(slot, dev, blockno));
                    }
                    if let Some(slot) = h.find_free() {
                        self.claim(&mut h, slot, dev, blockno);
                        h.move_to_front(slot);
                        drop(h);
                        return Ok(self.lock_claimed(slot, dev, blockno));
                    }
                }
            }
        }

        log::error!(
            "[BCACHE] exhausted: no free slot for dev={} blockno={} (capacity={})",
            dev,
            blockno,
            self.capacity()
        );
        Err(Error::new(
            ErrorKind::Exhausted,
            "no free buffer slot in any bucket",
        ))
    }

    /// 改派空闲槽位到新身份
    ///
    /// 调用方持有管辖该槽位的桶锁（或槽位游离归其独占），且 `refcnt == 0`。
    fn claim(&self, guard: &mut BucketGuard<'_>, slot: usize, dev: u32, blockno: u64) {
        let evicted = {
            let m = guard.meta_mut(slot);
            debug_assert_eq!(m.refcnt, 0, "claim of referenced slot");
            let evicted = m.dev != NO_DEV;
            m.dev = dev;
            m.blockno = blockno;
            m.refcnt = 1;
            evicted
        };
        if evicted {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        // SAFETY: refcnt 为 0 时不存在内容锁持有者，而新的获取者必须
        // 先在当前持有的桶锁下递增 refcnt，因此对内容状态独占。
        unsafe {
            (*self.slots[slot].as_ptr()).flags = SlotFlags::empty();
        }
    }

    fn lock_hit(&self, slot: usize, dev: u32, blockno: u64) -> usize {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        log::trace!("[BCACHE] fetch dev={} blockno={} HIT slot={}", dev, blockno, slot);
        self.slots[slot].acquire();
        slot
    }

    fn lock_claimed(&self, slot: usize, dev: u32, blockno: u64) -> usize {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        log::trace!("[BCACHE] fetch dev={} blockno={} MISS slot={}", dev, blockno, slot);
        self.slots[slot].acquire();
        slot
    }

    /// release 的后半程：放开内容锁，递减引用计数，
    /// 归零时移到归属桶表头（最近使用端，最不易被驱逐）。
    fn release_slot(&self, slot: usize, dev: u32, blockno: u64) {
        self.slots[slot].release();

        let mut guard = self.index.lock(self.index.bucket_of(blockno));
        let m = guard.meta_mut(slot);
        debug_assert!(m.refcnt > 0, "release of unreferenced slot");
        m.refcnt -= 1;
        if m.refcnt == 0 {
            guard.move_to_front(slot);
        }
        drop(guard);
        log::trace!("[BCACHE] release dev={} blockno={} slot={}", dev, blockno, slot);
    }
}

impl<D: BlockDevice> fmt::Debug for BufCache<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufCache")
            .field("capacity", &self.capacity())
            .field("bucket_count", &self.bucket_count())
            .field("block_size", &self.block_size)
            .field("stats", &self.stats())
            .finish()
    }
}

/// 已获取块的独占句柄
///
/// 由 [`BufCache::fetch`] 返回，存活期间持有槽位的内容锁：
/// 引用计数大于零保证身份不会被改派，内容锁保证载荷独占。
/// drop 时自动 release（也可用 [`Self::release`] 显式释放）。
///
/// flush / release "必须持有内容锁" 的协议要求由句柄所有权静态保证，
/// 无法在未持锁时调用。
pub struct BlockHandle<'a, D: BlockDevice> {
    cache: &'a BufCache<D>,
    slot: usize,
    dev: u32,
    blockno: u64,
    released: bool,
}

impl<'a, D: BlockDevice> BlockHandle<'a, D> {
    /// 设备标识
    pub fn dev(&self) -> u32 {
        self.dev
    }

    /// 块号
    pub fn blockno(&self) -> u64 {
        self.blockno
    }

    /// 访问载荷（只读）
    pub fn data(&self) -> &[u8] {
        &self.slot_data().bytes
    }

    /// 访问载荷（可写），自动标记为脏
    ///
    /// 注意：驱逐不会写回。修改后不 [`Self::flush`] 就释放，
    /// 改动会在槽位被改派时丢弃。
    pub fn data_mut(&mut self) -> &mut [u8] {
        let data = self.slot_data_mut();
        data.flags.insert(SlotFlags::DIRTY);
        &mut data.bytes
    }

    /// 载荷是否被修改且尚未写回
    pub fn is_dirty(&self) -> bool {
        self.slot_data().flags.contains(SlotFlags::DIRTY)
    }

    /// 把载荷同步写回设备
    ///
    /// 不释放内容锁，也不改变引用计数；可在持有期间多次调用。
    pub fn flush(&mut self) -> Result<()> {
        debug_assert!(
            self.cache.slots[self.slot].holding(),
            "flush without holding the content lock"
        );
        // SAFETY: 句柄存活即持有内容锁
        let data = unsafe { &mut *self.cache.slots[self.slot].as_ptr() };
        self.cache
            .device
            .write_block(self.dev, self.blockno, &data.bytes)?;
        data.flags.remove(SlotFlags::DIRTY);
        self.cache.counters.writebacks.fetch_add(1, Ordering::Relaxed);
        log::trace!("[BCACHE] flush dev={} blockno={}", self.dev, self.blockno);
        Ok(())
    }

    /// pin 住该块：在归属桶索引锁下递增引用计数
    ///
    /// 句柄释放后块仍保持驻留（不可驱逐），直到配对的
    /// [`BufCache::unpin`]。不触碰内容锁与链表位置。
    pub fn pin(&self) {
        let mut guard = self
            .cache
            .index
            .lock(self.cache.index.bucket_of(self.blockno));
        guard.meta_mut(self.slot).refcnt += 1;
        drop(guard);
        log::trace!("[BCACHE] pin dev={} blockno={}", self.dev, self.blockno);
    }

    /// 显式释放（消费 self）
    ///
    /// 通常不需要手动调用，Drop trait 会自动处理。
    pub fn release(mut self) {
        self.do_release();
    }

    fn populate(&mut self) -> Result<()> {
        // SAFETY: 句柄存活即持有内容锁
        let data = unsafe { &mut *self.cache.slots[self.slot].as_ptr() };
        if !data.flags.contains(SlotFlags::UPTODATE) {
            self.cache
                .device
                .read_block(self.dev, self.blockno, &mut data.bytes)?;
            data.flags.insert(SlotFlags::UPTODATE);
        }
        Ok(())
    }

    fn slot_data(&self) -> &SlotData {
        // SAFETY: 句柄存活即持有内容锁
        unsafe { &*self.cache.slots[self.slot].as_ptr() }
    }

    fn slot_data_mut(&mut self) -> &mut SlotData {
        // SAFETY: 句柄存活即持有内容锁
        unsafe { &mut *self.cache.slots[self.slot].as_ptr() }
    }

    fn do_release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.cache.release_slot(self.slot, self.dev, self.blockno);
    }
}

impl<'a, D: BlockDevice> Drop for BlockHandle<'a, D> {
    fn drop(&mut self) {
        self.do_release();
    }
}

impl<'a, D: BlockDevice> fmt::Debug for BlockHandle<'a, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockHandle")
            .field("dev", &self.dev)
            .field("blockno", &self.blockno)
            .field("slot", &self.slot)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
