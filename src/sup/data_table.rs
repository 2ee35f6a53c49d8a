//! 数据流表（数据方向）
//!
//! 每条对端→本机的 TCP 流记录尚未被本机 ACK 确认的 PSH 段末尾序号（FIFO）。
//! 表项在 `[0, len)` 内连续存放；老化或删除时用最后一项填补空位。
//!
//! 已知限制：假设数据段按序到达，FIFO 中的末尾序号单调不减。乱序到达时某些记录会比
//! 必要的多保留一段时间，直到后面更大的 ACK 把它们一起弹出。

use tracing::{debug, trace, warn};

use super::pool::{SegIdx, SegPool};
use crate::error::SupError;
use crate::timer::Tick;
use crate::wire::{FlowTuple, seq_ge};

#[derive(Debug, Clone)]
pub struct DataFlow {
    /// 数据方向的四元组（源 = 数据发送方）
    pub tuple: FlowTuple,
    head: Option<SegIdx>,
    tail: Option<SegIdx>,
    pub last_used: Tick,
}

impl DataFlow {
    fn new(tuple: FlowTuple, now: Tick) -> Self {
        Self {
            tuple,
            head: None,
            tail: None,
            last_used: now,
        }
    }

    fn push(&mut self, pool: &mut SegPool, rec: SegIdx) {
        match self.tail {
            Some(tail) => pool.link(tail, rec),
            None => self.head = Some(rec),
        }
        self.tail = Some(rec);
    }

    /// 把所有记录归还记录池
    fn drain(&mut self, pool: &mut SegPool) {
        while let Some(rec) = self.head {
            self.head = pool.unlink(rec);
            trace!(end_seq = pool.end_seq(rec), "清理 PSH 段记录");
            if pool.release(rec).is_err() {
                break;
            }
        }
        self.head = None;
        self.tail = None;
    }
}

#[derive(Debug)]
pub struct DataFlowTable {
    flows: Vec<DataFlow>,
    capacity: usize,
    timeout_ms: u64,
    aged: usize,
}

impl DataFlowTable {
    pub fn new(capacity: usize, timeout_ms: u64) -> Result<Self, SupError> {
        let mut flows = Vec::new();
        flows
            .try_reserve_exact(capacity)
            .map_err(|_| SupError::NoMemory("data flow table"))?;
        Ok(Self {
            flows,
            capacity,
            timeout_ms,
            aged: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 取走自上次调用以来被老化掉的表项数
    pub fn take_aged(&mut self) -> usize {
        std::mem::take(&mut self.aged)
    }

    /// 记录一个 PSH 数据段的末尾序号。
    ///
    /// 查找过程中顺带老化空闲超时的表项（用最后一项填补后继续扫描当前位置），
    /// 所以一次调用既可能淘汰旧表项也可能新建表项。
    pub fn record_segment(
        &mut self,
        pool: &mut SegPool,
        tuple: FlowTuple,
        end_seq: u32,
        now: Tick,
    ) -> Result<(), SupError> {
        let mut found = None;
        let mut i = 0;
        while i < self.flows.len() {
            if self.flows[i].tuple == tuple {
                self.flows[i].last_used = now;
                found = Some(i);
                break;
            }
            if now.since(self.flows[i].last_used) > self.timeout_ms {
                let mut stale = self.flows.swap_remove(i);
                stale.drain(pool);
                self.aged += 1;
                debug!(idx = i, flow = %stale.tuple, remaining = self.flows.len(), "数据流表项老化");
                continue;
            }
            i += 1;
        }

        let idx = match found {
            Some(idx) => idx,
            None => {
                if self.flows.len() >= self.capacity {
                    warn!(flow = %tuple, capacity = self.capacity, "数据流表已满");
                    return Err(SupError::TableFull("data flow"));
                }
                debug!(idx = self.flows.len(), flow = %tuple, "新增数据流表项");
                self.flows.push(DataFlow::new(tuple, now));
                self.flows.len() - 1
            }
        };

        let rec = pool.acquire()?;
        pool.set_end_seq(rec, end_seq);
        self.flows[idx].push(pool, rec);
        trace!(flow = %tuple, end_seq, "记录 PSH 数据段");
        Ok(())
    }

    /// 用一个 ACK（其四元组是数据方向的反向）弹出所有已被确认的 PSH 段。
    ///
    /// 至少弹出一条时返回 true。
    pub fn is_acked(&mut self, pool: &mut SegPool, ack_tuple: &FlowTuple, ack: u32) -> bool {
        let key = ack_tuple.reversed();
        let Some(flow) = self.flows.iter_mut().find(|f| f.tuple == key) else {
            trace!(flow = %ack_tuple, "无对应数据流");
            return false;
        };

        let mut acked = false;
        while let Some(rec) = flow.head {
            let end_seq = pool.end_seq(rec);
            if !seq_ge(ack, end_seq) {
                break;
            }
            trace!(ack, end_seq, "PSH 数据已被确认");
            flow.head = pool.unlink(rec);
            if pool.release(rec).is_err() {
                break;
            }
            acked = true;
        }
        if flow.head.is_none() {
            flow.tail = None;
        }
        acked
    }

    /// 某条数据流上尚未确认的末尾序号（FIFO 顺序）
    pub fn outstanding(&self, pool: &SegPool, tuple: &FlowTuple) -> Option<Vec<u32>> {
        let flow = self.flows.iter().find(|f| f.tuple == *tuple)?;
        let mut out = Vec::new();
        let mut cur = flow.head;
        while let Some(rec) = cur {
            out.push(pool.end_seq(rec));
            cur = pool.next(rec);
        }
        Some(out)
    }

    /// 清空所有表项并归还全部记录
    pub fn clear(&mut self, pool: &mut SegPool) {
        for flow in &mut self.flows {
            flow.drain(pool);
        }
        self.flows.clear();
    }
}
