//! 记录型总线
//!
//! 把每一次总线调用按顺序记下来，供回放工具输出和测试断言。

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::Bus;
use super::packet::Packet;
use crate::wire::TcpFrame;

/// 一次总线调用
#[derive(Debug, Clone)]
pub enum BusCall {
    Send { ifidx: usize, pkt: Packet },
    Free { pkt: Packet, send_q: bool },
    TxInRx(bool),
}

/// 可序列化的调用记录（报文只保留 id 和发送时刻的 ACK 号）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusLogEntry {
    Send {
        ifidx: usize,
        pkt_id: u64,
        #[serde(default)]
        ack: Option<u32>,
    },
    Free {
        pkt_id: u64,
        send_q: bool,
    },
    TxInRx {
        enabled: bool,
    },
}

#[derive(Debug, Default)]
pub struct RecordingBus {
    calls: Mutex<Vec<BusCall>>,
    log: Mutex<Vec<BusLogEntry>>,
}

impl RecordingBus {
    pub fn calls(&self) -> Vec<BusCall> {
        lock(&self.calls).clone()
    }

    pub fn log(&self) -> Vec<BusLogEntry> {
        lock(&self.log).clone()
    }

    /// 已发送的报文，按发送顺序
    pub fn sent(&self) -> Vec<(usize, Packet)> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                BusCall::Send { ifidx, pkt } => Some((*ifidx, pkt.clone())),
                _ => None,
            })
            .collect()
    }

    /// 已释放的报文及其释放方式
    pub fn freed(&self) -> Vec<(Packet, bool)> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                BusCall::Free { pkt, send_q } => Some((pkt.clone(), *send_q)),
                _ => None,
            })
            .collect()
    }

    /// 调度提示的历史
    pub fn tx_in_rx(&self) -> Vec<bool> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                BusCall::TxInRx(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
        lock(&self.log).clear();
    }
}

impl Bus for RecordingBus {
    fn send_pkt(&self, ifidx: usize, pkt: Packet) {
        let ack = pkt.with_data(TcpFrame::parse).map(|h| h.ack);
        lock(&self.log).push(BusLogEntry::Send {
            ifidx,
            pkt_id: pkt.id(),
            ack,
        });
        lock(&self.calls).push(BusCall::Send { ifidx, pkt });
    }

    fn set_tx_in_rx(&self, enabled: bool) {
        lock(&self.log).push(BusLogEntry::TxInRx { enabled });
        lock(&self.calls).push(BusCall::TxInRx(enabled));
    }

    fn free_pkt(&self, pkt: Packet, send_q: bool) {
        lock(&self.log).push(BusLogEntry::Free {
            pkt_id: pkt.id(),
            send_q,
        });
        lock(&self.calls).push(BusCall::Free { pkt, send_q });
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
