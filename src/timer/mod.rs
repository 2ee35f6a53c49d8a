//! 定时器模块
//!
//! 为 HOLD 模式的每个 ACK 槽提供单调时钟、截止时间队列以及后台触发线程。

// 子模块声明
mod clock;
mod thread;
mod time;
mod timer_queue;

// 重新导出公共接口
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use thread::TimerThread;
pub use time::Tick;
pub use timer_queue::TimerQueue;
