//! 块缓冲缓存常量定义
//!
//! 这些是构建期的默认配置；[`crate::BufCache::with_config`] 允许在构造时
//! 显式指定容量与分桶数（用于测试或特殊部署）。

/// 默认块大小（字节）
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// 默认槽位池容量（槽位总数）
///
/// 必须不小于系统中同时持有块数的峰值，否则会触发
/// [`crate::ErrorKind::Exhausted`]。
pub const DEFAULT_POOL_CAPACITY: usize = 30;

/// 默认桶数量
///
/// 取小素数即可；桶数只影响并发度与驱逐扫描顺序，不影响正确性。
pub const DEFAULT_BUCKET_COUNT: usize = 13;
