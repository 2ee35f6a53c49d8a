//! TCP ACK 抑制模块
//!
//! 在报文发往无线之前拦截纯 ACK：替换队列中更旧的 ACK（SUPPRESS）、在对端 PSH 数据被确认前
//! 推迟发送（DELAY_TRANSMIT），或短暂持有以合并后续 ACK（HOLD）。
//! 所有表与记录池都在同一把锁之下。

// 子模块声明
mod ack_table;
mod config;
mod data_table;
mod engine;
mod mode;
mod pool;
mod stats;

// 重新导出公共接口
pub use ack_table::{AckEntry, HoldOutcome, HoldTable, MergeOutcome, ReplaceTable};
pub use config::{
    ConfigError, Limits, SupConfig, TCPACK_DELAY_TIME, TCPACK_INFO_MAXNUM, TCPACK_SUPP_RATIO,
    TCPDATA_INFO_MAXNUM, TCPDATA_INFO_TIMEOUT, TCPDATA_PSH_INFO_MAXNUM,
};
pub use data_table::{DataFlow, DataFlowTable};
pub use engine::{ModeChange, TcpAckSup, TxVerdict};
pub use mode::{BusKind, SupMode};
pub use pool::{SegIdx, SegPool};
pub use stats::SupStats;
