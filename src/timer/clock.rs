//! 时钟抽象
//!
//! 引擎只通过 [`Clock`] 读取时间：驱动里用单调时钟，测试与回放用手动时钟。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::time::Tick;

/// 毫秒精度的单调时钟。
pub trait Clock: Send + Sync {
    fn now(&self) -> Tick;
}

/// 以创建时刻为零点的系统单调时钟
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Tick {
        let ms = self.origin.elapsed().as_millis();
        Tick(u64::try_from(ms).unwrap_or(u64::MAX))
    }
}

/// 手动推进的时钟。
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Tick) -> Self {
        Self {
            now_ms: AtomicU64::new(start.0),
        }
    }

    pub fn set(&self, at: Tick) {
        self.now_ms.store(at.0, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) -> Tick {
        let prev = self.now_ms.fetch_add(ms, Ordering::SeqCst);
        Tick(prev.saturating_add(ms))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        Tick(self.now_ms.load(Ordering::SeqCst))
    }
}
