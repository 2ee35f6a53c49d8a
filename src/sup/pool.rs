//! PSH 段记录池
//!
//! 一次性分配的定长数组，空闲记录用下标串成单链表。记录要么挂在某条数据流的 FIFO 上，
//! 要么在空闲链上，二者必居其一。

use tracing::{trace, warn};

use crate::error::{SupError, invariant_violation};

/// 记录在池中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegIdx(usize);

#[derive(Debug, Clone, Copy, Default)]
struct SegRecord {
    end_seq: u32,
    next: Option<SegIdx>,
    free: bool,
}

#[derive(Debug)]
pub struct SegPool {
    recs: Vec<SegRecord>,
    free_head: Option<SegIdx>,
    free_cnt: usize,
}

impl SegPool {
    /// 分配 `capacity` 条记录并全部放入空闲链
    pub fn new(capacity: usize) -> Result<Self, SupError> {
        let mut recs = Vec::new();
        recs.try_reserve_exact(capacity)
            .map_err(|_| SupError::NoMemory("PSH segment pool"))?;
        recs.resize(capacity, SegRecord::default());

        let mut pool = Self {
            recs,
            free_head: None,
            free_cnt: 0,
        };
        for i in 0..capacity {
            pool.release(SegIdx(i))?;
        }
        Ok(pool)
    }

    pub fn capacity(&self) -> usize {
        self.recs.len()
    }

    pub fn free_count(&self) -> usize {
        self.free_cnt
    }

    pub fn in_use(&self) -> usize {
        self.capacity() - self.free_cnt
    }

    /// 取出一条空闲记录
    pub fn acquire(&mut self) -> Result<SegIdx, SupError> {
        let Some(idx) = self.free_head else {
            warn!(capacity = self.capacity(), "PSH 段记录池耗尽");
            return Err(SupError::PoolExhausted);
        };
        let rec = &mut self.recs[idx.0];
        self.free_head = rec.next.take();
        rec.free = false;
        self.free_cnt -= 1;
        trace!(idx = idx.0, free = self.free_cnt, "取出 PSH 段记录");
        Ok(idx)
    }

    /// 归还一条记录。记录必须已从所在 FIFO 摘下（`next` 为空）且当前不在空闲链上。
    pub fn release(&mut self, idx: SegIdx) -> Result<(), SupError> {
        let Some(rec) = self.recs.get_mut(idx.0) else {
            return Err(invariant_violation(format!(
                "release of out-of-range segment record {}",
                idx.0
            )));
        };
        if rec.free {
            return Err(invariant_violation(format!(
                "double release of segment record {}",
                idx.0
            )));
        }
        if rec.next.is_some() {
            return Err(invariant_violation(format!(
                "release of still-linked segment record {}",
                idx.0
            )));
        }
        rec.next = self.free_head;
        rec.free = true;
        rec.end_seq = 0;
        self.free_head = Some(idx);
        self.free_cnt += 1;
        Ok(())
    }

    pub fn end_seq(&self, idx: SegIdx) -> u32 {
        self.recs[idx.0].end_seq
    }

    pub fn set_end_seq(&mut self, idx: SegIdx, end_seq: u32) {
        self.recs[idx.0].end_seq = end_seq;
    }

    /// 把 `next` 接在 `prev` 之后
    pub(crate) fn link(&mut self, prev: SegIdx, next: SegIdx) {
        self.recs[prev.0].next = Some(next);
    }

    /// 摘下 `idx` 的后继链接并返回它
    pub(crate) fn unlink(&mut self, idx: SegIdx) -> Option<SegIdx> {
        self.recs[idx.0].next.take()
    }

    pub(crate) fn next(&self, idx: SegIdx) -> Option<SegIdx> {
        self.recs[idx.0].next
    }

    /// 销毁记录池。所有记录必须已经归还，否则说明有记录泄漏或链表被破坏。
    pub fn teardown(self) -> Result<(), SupError> {
        let mut cnt = 0usize;
        let mut cur = self.free_head;
        while let Some(idx) = cur {
            cnt += 1;
            if cnt > self.recs.len() {
                break;
            }
            cur = self.recs[idx.0].next;
        }
        if cnt != self.recs.len() {
            return Err(invariant_violation(format!(
                "segment pool teardown found {cnt} free records, expected {}",
                self.recs.len()
            )));
        }
        Ok(())
    }
}
