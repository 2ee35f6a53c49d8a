//! 轨迹回放
//!
//! 用手动时钟和记录型总线把一段 JSON 轨迹喂给抑制引擎，得到确定的统计与总线调用序列。

mod runner;
mod trace;

pub use runner::{ReplayError, ReplayReport, replay};
pub use trace::{Trace, TraceAction, TraceEvent};
