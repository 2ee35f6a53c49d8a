use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::trace::{Trace, TraceAction};
use crate::bus::{Bus, BusLogEntry, Packet, RecordingBus};
use crate::error::SupError;
use crate::sup::{SupMode, SupStats, TcpAckSup, TxVerdict};
use crate::timer::{Clock, ManualClock, Tick};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Sup(#[from] SupError),
    #[error("event {index} goes back in time: {at_ms}ms < {now_ms}ms")]
    TimeWentBack { index: usize, at_ms: u64, now_ms: u64 },
    #[error("event {index}: packet {id} is not in the transmit queue")]
    UnknownPacket { index: usize, id: u64 },
    #[error("event {index}: transmit queue is empty")]
    EmptyQueue { index: usize },
}

/// 回放结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub final_mode: SupMode,
    pub stats: SupStats,
    /// 最终真正发到无线上的报文 id，按顺序
    pub sent: Vec<u64>,
    /// 被引擎释放的报文 id
    pub freed: Vec<u64>,
    pub tx_in_rx: Vec<bool>,
    pub bus_log: Vec<BusLogEntry>,
    pub end_ms: u64,
}

// 驱动发送队列的替身：被放行的报文排在这里，直到 xmit_done 或回放结束
struct TxQueue {
    pkts: VecDeque<(usize, Packet)>,
}

impl TxQueue {
    fn take(&mut self, id: Option<u64>) -> Option<(usize, Packet)> {
        match id {
            None => self.pkts.pop_front(),
            Some(id) => {
                let pos = self.pkts.iter().position(|(_, p)| p.id() == id)?;
                self.pkts.remove(pos)
            }
        }
    }
}

fn transmit(sup: &TcpAckSup, bus: &RecordingBus, ifidx: usize, pkt: Packet) {
    sup.on_xmit(&pkt);
    bus.send_pkt(ifidx, pkt);
}

// 把时钟推进到 `to`，途中依次触发到期的槽定时器
fn advance(sup: &TcpAckSup, clock: &ManualClock, to: Tick) {
    while let Some(deadline) = sup.next_timer_deadline() {
        if deadline > to {
            break;
        }
        clock.set(deadline.max(clock.now()));
        sup.run_timers();
    }
    clock.set(to);
}

/// 回放一段轨迹
pub fn replay(trace: &Trace) -> Result<ReplayReport, ReplayError> {
    let bus = Arc::new(RecordingBus::default());
    let clock = Arc::new(ManualClock::new(Tick::ZERO));
    let sup = TcpAckSup::new(&trace.config, bus.clone(), clock.clone())?;
    let mut queue = TxQueue {
        pkts: VecDeque::new(),
    };
    let mut next_id = 1_u64;

    info!(
        mode = %trace.config.mode,
        events = trace.events.len(),
        "开始回放"
    );

    for (index, ev) in trace.events.iter().enumerate() {
        let now_ms = clock.now().as_millis();
        if ev.at_ms < now_ms {
            return Err(ReplayError::TimeWentBack {
                index,
                at_ms: ev.at_ms,
                now_ms,
            });
        }
        advance(&sup, &clock, Tick::from_millis(ev.at_ms));

        match &ev.action {
            TraceAction::Tx { ifidx, frame, id } => {
                let id = id.unwrap_or(next_id);
                next_id = next_id.max(id) + 1;
                let pkt = Packet::new(id, frame.build());
                match sup.on_tx(pkt, *ifidx) {
                    TxVerdict::Send(pkt) => queue.pkts.push_back((*ifidx, pkt)),
                    TxVerdict::Consumed => debug!(id, "报文被抑制模块接管"),
                }
            }
            TraceAction::Rx { frame } => {
                let pkt = Packet::new(0, frame.build());
                sup.on_rx(&pkt);
            }
            TraceAction::XmitDone { id } => {
                let (ifidx, pkt) = match (queue.take(*id), id) {
                    (Some(entry), _) => entry,
                    (None, Some(id)) => return Err(ReplayError::UnknownPacket { index, id: *id }),
                    (None, None) => return Err(ReplayError::EmptyQueue { index }),
                };
                transmit(&sup, &bus, ifidx, pkt);
            }
            TraceAction::SetMode { mode } => {
                if let Err(e) = sup.set_mode(*mode) {
                    warn!(index, error = %e, "set_mode 失败，继续回放");
                }
            }
            TraceAction::SetRatio { ratio } => sup.set_hold_ratio(*ratio)?,
            TraceAction::SetDelay { delay_ms } => sup.set_hold_delay(*delay_ms),
            TraceAction::Clean => sup.clean(),
        }
    }

    // 排空：先让剩余的定时器到期，再按顺序发完队列
    while let Some(deadline) = sup.next_timer_deadline() {
        advance(&sup, &clock, deadline);
    }
    while let Some((ifidx, pkt)) = queue.pkts.pop_front() {
        transmit(&sup, &bus, ifidx, pkt);
    }

    let report = ReplayReport {
        final_mode: sup.mode(),
        stats: sup.stats(),
        sent: bus.sent().iter().map(|(_, p)| p.id()).collect(),
        freed: bus.freed().iter().map(|(p, _)| p.id()).collect(),
        tx_in_rx: bus.tx_in_rx(),
        bus_log: bus.log(),
        end_ms: clock.now().as_millis(),
    };
    info!(sent = report.sent.len(), freed = report.freed.len(), "回放结束");
    Ok(report)
}
