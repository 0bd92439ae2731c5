//! 同步原语
//!
//! 桶索引使用 `spin::Mutex` 做短临界区保护；槽位内容使用 [`SleepLock`]，
//! 它允许跨函数边界长时间持有（fetch 返回后由句柄持有，release 时归还）。

mod sleeplock;

pub use sleeplock::SleepLock;
