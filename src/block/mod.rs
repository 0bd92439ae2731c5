//! 块设备抽象
//!
//! 缓存核心通过 [`BlockDevice`] trait 调用底层驱动读写块的原始字节。
//! 设备调用只发生在调用方已持有槽位内容锁、且未持有任何桶索引锁时，
//! 因此可能因磁盘延迟而长时间阻塞。

mod device;

pub use device::BlockDevice;
