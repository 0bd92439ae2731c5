//! 块设备核心类型

use crate::error::Result;

/// 块设备接口
///
/// 实现此 trait 以提供底层块设备访问。一个逻辑存储命名空间由
/// `(device, block_number)` 二元组寻址；实现者负责把它映射到具体介质。
///
/// 缓存会从多个线程并发调用本接口（每个调用方持有不同槽位的内容锁），
/// 因此方法接收 `&self`；对物理介质的串行化是设备自身的职责。
///
/// # 示例
///
/// ```rust,ignore
/// use bcache_core::{BlockDevice, Result};
///
/// struct MyDevice {
///     // ...
/// }
///
/// impl BlockDevice for MyDevice {
///     fn block_size(&self) -> usize {
///         1024
///     }
///
///     fn read_block(&self, dev: u32, blockno: u64, buf: &mut [u8]) -> Result<()> {
///         // 从介质读取一个块
///         Ok(())
///     }
///
///     fn write_block(&self, dev: u32, blockno: u64, buf: &[u8]) -> Result<()> {
///         // 把一个块写入介质
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 块大小（字节），同时决定缓存槽位的载荷大小
    fn block_size(&self) -> usize;

    /// 读取一个块
    ///
    /// # 参数
    ///
    /// * `dev` - 设备标识
    /// * `blockno` - 块号
    /// * `buf` - 目标缓冲区（长度为 `block_size()`）
    fn read_block(&self, dev: u32, blockno: u64, buf: &mut [u8]) -> Result<()>;

    /// 写入一个块
    ///
    /// # 参数
    ///
    /// * `dev` - 设备标识
    /// * `blockno` - 块号
    /// * `buf` - 源缓冲区（长度为 `block_size()`）
    fn write_block(&self, dev: u32, blockno: u64, buf: &[u8]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::vec;
    use std::vec::Vec;

    struct MockDevice {
        block_size: usize,
        storage: Mutex<BTreeMap<(u32, u64), Vec<u8>>>,
    }

    impl MockDevice {
        fn new(block_size: usize) -> Self {
            Self {
                block_size,
                storage: Mutex::new(BTreeMap::new()),
            }
        }
    }

    impl BlockDevice for MockDevice {
        fn block_size(&self) -> usize {
            self.block_size
        }

        fn read_block(&self, dev: u32, blockno: u64, buf: &mut [u8]) -> Result<()> {
            let storage = self.storage.lock().unwrap();
            match storage.get(&(dev, blockno)) {
                Some(data) => buf.copy_from_slice(data),
                None => buf.fill(0),
            }
            Ok(())
        }

        fn write_block(&self, dev: u32, blockno: u64, buf: &[u8]) -> Result<()> {
            let mut storage = self.storage.lock().unwrap();
            storage.insert((dev, blockno), buf.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_mock_device_roundtrip() {
        let device = MockDevice::new(512);
        let data = vec![0xAB; 512];
        device.write_block(0, 7, &data).unwrap();

        let mut buf = vec![0u8; 512];
        device.read_block(0, 7, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn test_mock_device_unwritten_reads_zero() {
        let device = MockDevice::new(512);
        let mut buf = vec![0xFFu8; 512];
        device.read_block(1, 99, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }
}
