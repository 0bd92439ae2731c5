//! 块缓冲缓存模块
//!
//! 这个模块实现完整的缓冲缓存：固定容量的槽位池、分桶哈希索引，
//! 以及调用方使用的 fetch / flush / release / pin 协议。
//!
//! # 主要组件
//!
//! - [`BufCache`] - 缓存管理器，进程全局对象，启动时构造一次
//! - [`BlockHandle`] - 已获取块的独占句柄（RAII，drop 时自动 release）
//! - [`SlotFlags`] - 槽位内容状态标志
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 设计原理
//!
//! 经典 Unix 内核的 bcache 设计：每个磁盘块在内存中至多有一份活跃副本，
//! 对同一块的并发访问被该副本的内容锁串行化，对不同块的访问互不干扰。
//!
//! 1. **槽位池**：固定数量的槽位在初始化时一次性建立（全部挂入 0 号桶），
//!    之后只被反复改派身份，永不销毁。
//! 2. **桶索引**：`blockno mod bucket_count` 决定归属桶；每个桶是一条
//!    独立加锁的循环双向链表（以槽位下标为链接，无裸指针），
//!    表头是最近使用端，表尾是驱逐候选端。
//! 3. **两级锁**：桶索引锁是短临界区自旋锁，只保护链表与槽位元数据，
//!    绝不跨 I/O 持有；内容锁是睡眠锁，保护载荷，可长时间持有。
//!    加锁次序固定为：索引锁（按桶号升序）→ 内容锁，不存在反向嵌套。
//! 4. **驱逐**：归属桶没有空闲槽位时，按升序锁次序到其他桶的表尾
//!    窃取 `ref_count == 0` 的槽位，迁入归属桶。桶内是精确的
//!    最近使用序，跨桶是近似 LRU。
//!
//! # 锁次序与死锁
//!
//! 跨桶驱逐需要同时持有两个桶的索引锁。本实现强制按桶号升序获取：
//! 候选桶号小于归属桶号时，先放开归属桶锁、锁候选桶并摘下牺牲槽位，
//! 再重新锁归属桶并重做命中检查（期间其他线程可能已缓存了同一块）。
//! 因此任何线程同时持有的索引锁都是升序获取的，不存在环路等待。

mod block_cache;
mod bucket;
mod slot;

pub use block_cache::{BlockHandle, BufCache, CacheStats};
pub use slot::SlotFlags;
