//! 槽定时器队列
//!
//! 每个 ACK 槽最多一个有效定时器。布防/取消只修改槽的代数，过期的堆条目在出堆时丢弃，
//! 因此取消是同步且 O(1) 的，不需要回调方参与。

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::trace;

use super::time::Tick;

// 堆中的一次布防；`generation` 落后于槽当前代数即已失效
#[derive(Debug)]
struct ScheduledTimer {
    at: Tick,
    seq: u64,
    slot: usize,
    generation: u64,
}

impl ScheduledTimer {
    fn key(&self) -> (Tick, u64) {
        (self.at, self.seq)
    }
}

// 截止时间早者优先，同一时刻按布防顺序
impl Ord for ScheduledTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for ScheduledTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduledTimer {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ScheduledTimer {}

#[derive(Debug, Clone, Copy, Default)]
struct SlotTimer {
    generation: u64,
    deadline: Option<Tick>,
}

/// 固定槽数的定时器队列：维护各槽的截止时间与最小堆。
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_seq: u64,
    slots: Vec<SlotTimer>,
    q: BinaryHeap<ScheduledTimer>,
}

impl TimerQueue {
    pub fn with_slots(n: usize) -> Self {
        Self {
            next_seq: 0,
            slots: vec![SlotTimer::default(); n],
            q: BinaryHeap::with_capacity(n),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// 为 `slot` 布防（或重新布防）到 `at`；旧的布防自动失效。
    pub fn arm(&mut self, slot: usize, at: Tick) {
        let Some(st) = self.slots.get_mut(slot) else {
            return;
        };
        st.generation = st.generation.wrapping_add(1);
        st.deadline = Some(at);
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        trace!(slot, at = ?at, seq, "布防槽定时器");
        self.q.push(ScheduledTimer {
            at,
            seq,
            slot,
            generation: st.generation,
        });
        self.prune_if_bloated();
    }

    /// 取消 `slot` 的定时器；返回它之前是否处于布防状态。
    pub fn cancel(&mut self, slot: usize) -> bool {
        let Some(st) = self.slots.get_mut(slot) else {
            return false;
        };
        st.generation = st.generation.wrapping_add(1);
        st.deadline.take().is_some()
    }

    /// 取消全部槽定时器并清空堆。
    pub fn cancel_all(&mut self) {
        for st in &mut self.slots {
            st.generation = st.generation.wrapping_add(1);
            st.deadline = None;
        }
        self.q.clear();
    }

    pub fn is_armed(&self, slot: usize) -> bool {
        self.deadline(slot).is_some()
    }

    pub fn deadline(&self, slot: usize) -> Option<Tick> {
        self.slots.get(slot).and_then(|st| st.deadline)
    }

    pub fn armed_count(&self) -> usize {
        self.slots.iter().filter(|st| st.deadline.is_some()).count()
    }

    /// 弹出一个截止时间不晚于 `now` 的有效定时器，返回其槽号。
    pub fn pop_expired(&mut self, now: Tick) -> Option<usize> {
        while let Some(top) = self.q.peek() {
            if top.at > now {
                return None;
            }
            let item = self.q.pop()?;
            if self.is_live(&item) {
                self.slots[item.slot].deadline = None;
                return Some(item.slot);
            }
        }
        None
    }

    /// 最早的有效截止时间（顺带丢弃堆顶的失效条目）。
    pub fn next_deadline(&mut self) -> Option<Tick> {
        while let Some(top) = self.q.peek() {
            if self.is_live(top) {
                return Some(top.at);
            }
            self.q.pop();
        }
        None
    }

    fn is_live(&self, item: &ScheduledTimer) -> bool {
        self.slots
            .get(item.slot)
            .is_some_and(|st| st.generation == item.generation && st.deadline.is_some())
    }

    // 反复重新布防同一个槽会在堆里留下失效条目；超过槽数的若干倍时整体重建。
    fn prune_if_bloated(&mut self) {
        if self.q.len() <= self.slots.len().saturating_mul(4).max(8) {
            return;
        }
        let old = std::mem::take(&mut self.q);
        let live: Vec<ScheduledTimer> = old.into_iter().filter(|t| self.is_live(t)).collect();
        self.q = BinaryHeap::from(live);
    }
}
