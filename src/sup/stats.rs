//! 统计计数

use serde::{Deserialize, Serialize};

/// 抑制模块的累计计数（跨模式切换保留）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupStats {
    /// 进入 ACK 表处理的纯 ACK
    pub acks_seen: u64,
    /// 新加入 ACK 表的 ACK
    pub acks_queued: u64,
    /// 原地替换掉旧 ACK 的次数
    pub acks_replaced: u64,
    pub acks_duplicate: u64,
    pub acks_reordered: u64,
    pub len_mismatch: u64,
    /// HOLD 模式下被持有（含合并）的 ACK
    pub acks_held: u64,
    /// 达到抑制比而提前发送
    pub hold_flushes: u64,
    /// 定时器到期而发送
    pub timer_releases: u64,
    /// 在 ACK 到来时发现 PSH 数据已被确认
    pub psh_acked: u64,
    pub segs_recorded: u64,
    /// 表满或记录池耗尽而放弃跟踪的数据段
    pub segs_dropped: u64,
    pub flows_aged: u64,
}
