//! 单调时间类型
//!
//! 定义以毫秒为单位的时间点及其单位转换。

use serde::{Deserialize, Serialize};

/// 单调时间点（毫秒）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    pub fn from_millis(ms: u64) -> Tick {
        Tick(ms)
    }

    pub fn from_secs(s: u64) -> Tick {
        Tick(s.saturating_mul(1_000))
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// `ms` 毫秒之后的时间点（饱和）
    pub fn after(self, ms: u64) -> Tick {
        Tick(self.0.saturating_add(ms))
    }

    /// 距离 `earlier` 过去了多少毫秒；时钟回退时返回 0
    pub fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}
