//! bcache_core: 并发块缓冲缓存（buffer cache）
//!
//! 这是一个纯 Rust 实现的块缓冲缓存库，为块设备之上的文件系统代码提供：
//! - **固定容量**的缓冲槽位池（启动时一次性建立，永不增长/收缩）
//! - **分桶哈希索引**，不同块号可完全并发地命中/驱逐
//! - **两级锁协议**：短持有的桶索引自旋锁 + 长持有的槽位内容睡眠锁
//! - **读穿透（read-through）** 的 fetch / flush / release / pin 协议
//!
//! # 示例
//!
//! ```rust,ignore
//! use bcache_core::{BlockDevice, BufCache, Result};
//!
//! // 实现 BlockDevice trait
//! struct MyDevice {
//!     // ...
//! }
//!
//! impl BlockDevice for MyDevice {
//!     // 实现必要的方法
//!     // ...
//! }
//!
//! fn main() -> Result<()> {
//!     let cache = BufCache::new(MyDevice::new());
//!
//!     // 获取块（必要时从设备读入），独占持有
//!     let mut block = cache.fetch(0, 42)?;
//!     block.data_mut()[0] = 0x42;
//!     block.flush()?;
//!     block.release();
//!
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 块设备抽象
//! - [`sync`] - 睡眠锁（内容锁）
//! - [`cache`] - 槽位池、桶索引与缓存管理器
//! - [`consts`] - 默认配置常量

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 块设备抽象
pub mod block;

/// 同步原语
pub mod sync;

/// 块缓冲缓存
pub mod cache;

/// 常量定义
pub mod consts;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::BlockDevice;

// 缓存
pub use cache::{BlockHandle, BufCache, CacheStats, SlotFlags};

// 同步原语
pub use sync::SleepLock;

// 默认配置
pub use consts::{DEFAULT_BLOCK_SIZE, DEFAULT_BUCKET_COUNT, DEFAULT_POOL_CAPACITY};
