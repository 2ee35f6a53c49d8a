//! 总线/传输层边界
//!
//! 引擎把报文视为不透明句柄，只通过 [`Bus`] 发送、释放报文以及设置调度提示。

mod packet;
mod recording;

pub use packet::Packet;
pub use recording::{BusCall, BusLogEntry, RecordingBus};

/// 总线与报文缓冲区的协作方接口。
///
/// 引擎保证调用这些方法时不持有模块锁。
pub trait Bus: Send + Sync {
    /// 把报文交给总线发送；引擎不关心结果
    fn send_pkt(&self, ifidx: usize, pkt: Packet);

    /// 是否允许“接收期间也发送”（DELAY_TRANSMIT 模式的调度提示）
    fn set_tx_in_rx(&self, enabled: bool);

    /// 释放报文；`send_q` 为 true 时同时清理发送队列相关的记账
    fn free_pkt(&self, pkt: Packet, send_q: bool);
}
