//! 缓冲槽位的内容侧状态
//!
//! 一个槽位由两半组成：桶索引锁保护的元数据（身份、引用计数、链表位置，
//! 见 [`super::bucket`]），以及内容锁保护的载荷与状态标志（本模块）。

use alloc::boxed::Box;
use bitflags::bitflags;

bitflags! {
    /// 槽位内容状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlotFlags: u8 {
        /// 载荷反映当前身份对应的磁盘内容
        const UPTODATE = 0x01;
        /// 载荷被修改且尚未 flush 回设备
        const DIRTY    = 0x02;
    }
}

/// 槽位的载荷与内容侧状态，由槽位的睡眠锁保护
///
/// # 保护约定
///
/// 本结构只允许在下列两种情形之一被访问：
///
/// 1. 当前线程持有该槽位的内容锁（常规路径）；
/// 2. 当前线程持有该槽位所在桶的索引锁，且槽位 `ref_count == 0`
///    （改派路径：引用计数为零保证不存在内容锁持有者，而新的获取者
///    必须先在同一把索引锁下递增引用计数，因此独占成立）。
///
/// `UPTODATE` 即传统 bcache 中的 `valid` 位：改派时在情形 2 下清除，
/// 读穿透填充后在情形 1 下置位。
pub(crate) struct SlotData {
    /// 块载荷，大小固定为设备块大小
    pub bytes: Box<[u8]>,
    /// 状态标志
    pub flags: SlotFlags,
}

impl SlotData {
    /// 创建载荷清零、标志为空的槽位内容
    pub fn new(block_size: usize) -> Self {
        Self {
            bytes: alloc::vec![0u8; block_size].into_boxed_slice(),
            flags: SlotFlags::empty(),
        }
    }
}
