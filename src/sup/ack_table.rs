//! ACK 表（控制方向）
//!
//! 两种排布：
//! - [`ReplaceTable`]（SUPPRESS / DELAY_TRANSMIT）：表项在 `[0, len)` 内连续，引用的报文
//!   仍归发送队列所有；报文真正发出时按身份摘除并用最后一项补位。
//! - [`HoldTable`]（HOLD）：按固定槽号寻址，允许空洞，每个槽独占持有的报文并拥有一个定时器。

use tracing::{debug, trace, warn};

use crate::bus::Packet;
use crate::error::SupError;
use crate::wire::{TCPACKSZMAX, TcpFrame, seq_ge, seq_gt};

/// ACK 表中的一项
#[derive(Debug, Clone)]
pub struct AckEntry {
    pub pkt: Packet,
    /// 报文当前头部的解析结果；原地改写后随之更新
    pub hdr: TcpFrame,
    pub ifidx: usize,
    pub supp_cnt: u32,
}

/// [`ReplaceTable::try_merge_or_enqueue`] 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// 新 ACK 的头部已覆盖到队列中旧报文上；新报文应被释放
    Replaced { idx: usize, old_ack: u32, new_ack: u32 },
    /// 与表中 ACK 号相同
    Duplicate { idx: usize },
    /// 新 ACK 号比表中的旧（乱序）
    Reordered { idx: usize, old_ack: u32 },
    /// 头部长度不同，无法原地替换，两个报文都照常发送
    LengthMismatch { idx: usize },
    /// 未匹配，新报文进入空闲表项
    Queued { idx: usize },
    /// 未匹配且表满
    Full,
}

#[derive(Debug)]
pub struct ReplaceTable {
    entries: Vec<AckEntry>,
    capacity: usize,
}

impl ReplaceTable {
    pub fn new(capacity: usize) -> Result<Self, SupError> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(capacity)
            .map_err(|_| SupError::NoMemory("ACK table"))?;
        Ok(Self { entries, capacity })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> &[AckEntry] {
        &self.entries
    }

    /// 尝试把新 ACK 合并进同一流已排队的旧 ACK，否则占用一个空闲表项。
    pub fn try_merge_or_enqueue(&mut self, pkt: &Packet, hdr: &TcpFrame) -> MergeOutcome {
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            if entry.hdr.flow != hdr.flow {
                continue;
            }
            let old_ack = entry.hdr.ack;

            if seq_gt(hdr.ack, old_ack) {
                if !entry.hdr.same_header_layout(hdr) || !overwrite_header(entry, pkt, hdr) {
                    warn!(
                        idx,
                        new_ip = hdr.ip_hdr_len,
                        old_ip = entry.hdr.ip_hdr_len,
                        new_tcp = hdr.tcp_hdr_len,
                        old_tcp = entry.hdr.tcp_hdr_len,
                        old_ack,
                        new_ack = hdr.ack,
                        "头部长度不一致，放弃替换"
                    );
                    return MergeOutcome::LengthMismatch { idx };
                }
                debug!(idx, old_ack, new_ack = hdr.ack, "TCP ACK 原地替换");
                return MergeOutcome::Replaced {
                    idx,
                    old_ack,
                    new_ack: hdr.ack,
                };
            }
            if hdr.ack == old_ack {
                trace!(idx, ack = old_ack, "重复 ACK");
                return MergeOutcome::Duplicate { idx };
            }
            warn!(
                idx,
                old_ack,
                old_pkt = entry.pkt.id(),
                new_ack = hdr.ack,
                new_pkt = pkt.id(),
                "ACK 号回退"
            );
            return MergeOutcome::Reordered { idx, old_ack };
        }

        if self.entries.len() >= self.capacity {
            debug!(capacity = self.capacity, "无空闲 ACK 表项");
            return MergeOutcome::Full;
        }
        let idx = self.entries.len();
        debug!(idx, pkt = pkt.id(), flow = %hdr.flow, "ACK 加入表项");
        self.entries.push(AckEntry {
            pkt: pkt.clone(),
            hdr: *hdr,
            ifidx: 0,
            supp_cnt: 0,
        });
        MergeOutcome::Queued { idx }
    }

    /// 报文已离开发送队列：按身份摘除其表项，最后一项补位
    pub fn remove_packet(&mut self, pkt: &Packet) -> bool {
        let Some(idx) = self.entries.iter().position(|e| e.pkt.same(pkt)) else {
            return false;
        };
        trace!(idx, pkt = pkt.id(), cnt = self.entries.len(), "ACK 已发出");
        self.entries.swap_remove(idx);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// 把新报文的 IPv4+TCP 头逐字节覆盖到旧报文上
fn overwrite_header(entry: &mut AckEntry, pkt: &Packet, hdr: &TcpFrame) -> bool {
    let len = hdr.ip_total_len;
    let mut buf = [0u8; TCPACKSZMAX];
    let Some(scratch) = buf.get_mut(..len) else {
        return false;
    };
    let copied = pkt.with_data(|d| match d.get(hdr.l3_range()) {
        Some(src) => {
            scratch.copy_from_slice(src);
            true
        }
        None => false,
    });
    if !copied {
        return false;
    }
    let dst_range = entry.hdr.l3_off..entry.hdr.l3_off + len;
    let written = entry.pkt.with_data_mut(|d| match d.get_mut(dst_range) {
        Some(dst) => {
            dst.copy_from_slice(scratch);
            true
        }
        None => false,
    });
    if written {
        entry.hdr = TcpFrame {
            l3_off: entry.hdr.l3_off,
            ..*hdr
        };
    }
    written
}

/// [`HoldTable::try_hold`] 的结果。携带的报文由调用方在释放锁之后处理。
#[derive(Debug)]
pub enum HoldOutcome {
    /// 新流占用空槽，调用方需为该槽布防定时器
    Inserted { slot: usize },
    /// 槽改持新报文，计数未达抑制比；`freed` 是被替下的旧报文
    Coalesced { slot: usize, count: u32, freed: Packet },
    /// 计数达到抑制比：槽中旧报文立即发送，新报文重新占槽并从头计数
    Flushed {
        slot: usize,
        ifidx: usize,
        flushed: Packet,
    },
    /// 新 ACK 号比槽中的旧，丢弃新报文
    Stale { slot: usize, dropped: Packet },
    /// 未匹配且没有空槽，报文原样退回
    Full(Packet),
}

#[derive(Debug)]
pub struct HoldTable {
    slots: Vec<Option<AckEntry>>,
    occupied: usize,
}

impl HoldTable {
    pub fn new(capacity: usize) -> Result<Self, SupError> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| SupError::NoMemory("ACK hold table"))?;
        slots.resize_with(capacity, || None);
        Ok(Self { slots, occupied: 0 })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn slot(&self, slot: usize) -> Option<&AckEntry> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn try_hold(&mut self, pkt: Packet, hdr: TcpFrame, ifidx: usize, ratio: u32) -> HoldOutcome {
        let mut free_slot = None;
        for (slot, cell) in self.slots.iter_mut().enumerate() {
            let Some(entry) = cell else {
                free_slot.get_or_insert(slot);
                continue;
            };
            if entry.hdr.flow != hdr.flow {
                continue;
            }

            if !seq_ge(hdr.ack, entry.hdr.ack) {
                warn!(slot, old_ack = entry.hdr.ack, new_ack = hdr.ack, "ACK 号回退，丢弃新报文");
                return HoldOutcome::Stale { slot, dropped: pkt };
            }

            entry.supp_cnt += 1;
            let fresh = AckEntry {
                pkt,
                hdr,
                ifidx,
                supp_cnt: 1,
            };
            if entry.supp_cnt >= ratio {
                let old = std::mem::replace(entry, fresh);
                debug!(slot, ack = old.hdr.ack, count = old.supp_cnt, "达到抑制比，发送槽中报文");
                return HoldOutcome::Flushed {
                    slot,
                    ifidx: old.ifidx,
                    flushed: old.pkt,
                };
            }
            let count = entry.supp_cnt;
            let old = std::mem::replace(
                entry,
                AckEntry {
                    supp_cnt: count,
                    ..fresh
                },
            );
            trace!(slot, count, old_ack = old.hdr.ack, new_ack = hdr.ack, "合并 ACK");
            return HoldOutcome::Coalesced {
                slot,
                count,
                freed: old.pkt,
            };
        }

        let Some(slot) = free_slot else {
            debug!("无空闲 ACK 槽");
            return HoldOutcome::Full(pkt);
        };
        debug!(slot, pkt = pkt.id(), flow = %hdr.flow, "ACK 占用空槽");
        self.slots[slot] = Some(AckEntry {
            pkt,
            hdr,
            ifidx,
            supp_cnt: 1,
        });
        self.occupied += 1;
        HoldOutcome::Inserted { slot }
    }

    /// 清空一个槽并交出其报文（定时器到期时调用）
    pub fn take(&mut self, slot: usize) -> Option<AckEntry> {
        let entry = self.slots.get_mut(slot)?.take()?;
        self.occupied -= 1;
        Some(entry)
    }

    /// 清空全部槽
    pub fn drain(&mut self) -> Vec<AckEntry> {
        let out: Vec<AckEntry> = self.slots.iter_mut().filter_map(Option::take).collect();
        self.occupied = 0;
        out
    }
}
