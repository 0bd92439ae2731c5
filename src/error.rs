//! 错误类型定义
//!
//! 提供块缓冲缓存操作的错误类型。
//!
//! 缓存核心只有两类自身的失败：资源耗尽与协议违规。两者都不是瞬态条件，
//! 不应被捕获后重试；见各 [`ErrorKind`] 变体的说明。

use core::fmt;

/// 块缓冲缓存操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误（由设备协作者上报，缓存核心仅向上传递）
    Io,
    /// 槽位池耗尽：所有桶中都不存在 `ref_count == 0` 的槽位。
    ///
    /// 这是不可恢复的容量配置错误：在不释放其他块的情况下重试不可能成功。
    /// 正确配置的系统必须使池容量不小于同时持有块数的峰值。
    Exhausted,
    /// 无效状态：调用方违反了 fetch/release/pin 协议
    /// （例如 unpin 一个未被 pin 的块）。
    ///
    /// 表示协作者代码存在缺陷，不应捕获后继续。
    InvalidState,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
