//! 抑制引擎
//!
//! 每个驱动实例一个 [`TcpAckSup`]。所有表、记录池、槽定时器都在同一把锁之下；
//! 对总线的调用（发送、释放、调度提示）先收集起来，释放锁之后再执行，
//! 这样定时器回调与发送路径共用一个互斥域而不会相互等待。

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::Thread;

use tracing::{debug, error, info, trace, warn};

use super::ack_table::{AckEntry, HoldOutcome, HoldTable, MergeOutcome, ReplaceTable};
use super::config::{Limits, SupConfig};
use super::data_table::DataFlowTable;
use super::mode::{BusKind, SupMode};
use super::pool::SegPool;
use super::stats::SupStats;
use crate::bus::{Bus, Packet};
use crate::error::{SupError, invariant_violation};
use crate::timer::{Clock, Tick, TimerQueue};
use crate::wire::{FlowTuple, TcpFrame, ack_sized};

/// 发送路径上对一个报文的裁决
#[derive(Debug)]
pub enum TxVerdict {
    /// 照常发送（报文交还调用方）
    Send(Packet),
    /// 报文已被模块接管（合并、持有或丢弃），调用方不得再发送
    Consumed,
}

impl TxVerdict {
    pub fn is_consumed(&self) -> bool {
        matches!(self, TxVerdict::Consumed)
    }

    pub fn into_packet(self) -> Option<Packet> {
        match self {
            TxVerdict::Send(pkt) => Some(pkt),
            TxVerdict::Consumed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    AlreadySet(SupMode),
    Switched { from: SupMode, to: SupMode },
}

// 释放锁之后才执行的动作：总线调用，以及唤醒定时器线程
enum Deferred {
    Send { ifidx: usize, pkt: Packet },
    Free { pkt: Packet, send_q: bool },
    TxInRx(bool),
    TimerArmed,
}

enum AckTable {
    Replace(ReplaceTable),
    Hold { table: HoldTable, timers: TimerQueue },
}

// 只在 DELAY_TRANSMIT 下存在
struct DelayState {
    flows: DataFlowTable,
    pool: SegPool,
}

struct SupModule {
    acks: AckTable,
    delay: Option<DelayState>,
}

impl SupModule {
    fn build(mode: SupMode, limits: &Limits) -> Result<Self, SupError> {
        let acks = if mode.uses_replace_table() {
            AckTable::Replace(ReplaceTable::new(limits.ack_slots)?)
        } else {
            AckTable::Hold {
                table: HoldTable::new(limits.ack_slots)?,
                timers: TimerQueue::with_slots(limits.ack_slots),
            }
        };
        let delay = if mode == SupMode::DelayTx {
            Some(DelayState {
                flows: DataFlowTable::new(limits.data_flows, limits.data_timeout_ms)?,
                pool: SegPool::new(limits.psh_segments)?,
            })
        } else {
            None
        };
        Ok(Self { acks, delay })
    }

    // 先同步取消全部槽定时器，再交出持有的报文；最后归还并销毁记录池
    fn teardown(self, actions: &mut Vec<Deferred>) -> Result<(), SupError> {
        if let AckTable::Hold {
            mut table,
            mut timers,
        } = self.acks
        {
            timers.cancel_all();
            for entry in table.drain() {
                actions.push(Deferred::Free {
                    pkt: entry.pkt,
                    send_q: true,
                });
            }
        }
        if let Some(DelayState {
            mut flows,
            mut pool,
        }) = self.delay
        {
            flows.clear(&mut pool);
            actions.push(Deferred::TxInRx(true));
            pool.teardown()?;
        }
        Ok(())
    }
}

struct SupState {
    mode: SupMode,
    ratio: u32,
    delay_ms: u64,
    module: Option<SupModule>,
    stats: SupStats,
}

impl SupState {
    fn suppress(&mut self, pkt: Packet, hdr: &TcpFrame, actions: &mut Vec<Deferred>) -> TxVerdict {
        let SupState {
            mode,
            module,
            stats,
            ..
        } = self;
        let Some(module) = module.as_mut() else {
            invariant_violation(format!("no module state in mode {mode}"));
            return TxVerdict::Send(pkt);
        };
        stats.acks_seen += 1;

        let mut tx_in_rx = true;
        if *mode == SupMode::DelayTx {
            let acked = match module.delay.as_mut() {
                Some(d) => d.flows.is_acked(&mut d.pool, &hdr.flow, hdr.ack),
                None => false,
            };
            if acked {
                stats.psh_acked += 1;
            } else {
                tx_in_rx = false;
            }
        }

        let AckTable::Replace(table) = &mut module.acks else {
            invariant_violation(format!("hold table present in mode {mode}"));
            return TxVerdict::Send(pkt);
        };
        let verdict = match table.try_merge_or_enqueue(&pkt, hdr) {
            MergeOutcome::Replaced { .. } => {
                stats.acks_replaced += 1;
                actions.push(Deferred::Free { pkt, send_q: false });
                TxVerdict::Consumed
            }
            MergeOutcome::Duplicate { .. } => {
                stats.acks_duplicate += 1;
                tx_in_rx = true;
                TxVerdict::Send(pkt)
            }
            MergeOutcome::Reordered { .. } => {
                stats.acks_reordered += 1;
                TxVerdict::Send(pkt)
            }
            MergeOutcome::LengthMismatch { .. } => {
                stats.len_mismatch += 1;
                TxVerdict::Send(pkt)
            }
            MergeOutcome::Queued { .. } => {
                stats.acks_queued += 1;
                TxVerdict::Send(pkt)
            }
            MergeOutcome::Full => TxVerdict::Send(pkt),
        };

        if *mode == SupMode::DelayTx && tx_in_rx {
            actions.push(Deferred::TxInRx(true));
        }
        verdict
    }

    fn hold(
        &mut self,
        pkt: Packet,
        hdr: &TcpFrame,
        ifidx: usize,
        now: Tick,
        actions: &mut Vec<Deferred>,
    ) -> TxVerdict {
        let SupState {
            mode,
            ratio,
            delay_ms,
            module,
            stats,
        } = self;
        stats.acks_seen += 1;
        if *ratio <= 1 {
            return TxVerdict::Send(pkt);
        }
        let Some(AckTable::Hold { table, timers }) = module.as_mut().map(|m| &mut m.acks) else {
            invariant_violation(format!("no hold table in mode {mode}"));
            return TxVerdict::Send(pkt);
        };

        match table.try_hold(pkt, *hdr, ifidx, *ratio) {
            HoldOutcome::Inserted { slot } => {
                timers.arm(slot, now.after(*delay_ms));
                stats.acks_held += 1;
                actions.push(Deferred::TimerArmed);
                TxVerdict::Consumed
            }
            HoldOutcome::Coalesced { freed, .. } => {
                stats.acks_held += 1;
                actions.push(Deferred::Free {
                    pkt: freed,
                    send_q: true,
                });
                TxVerdict::Consumed
            }
            HoldOutcome::Flushed {
                slot,
                ifidx,
                flushed,
            } => {
                stats.acks_held += 1;
                stats.hold_flushes += 1;
                timers.arm(slot, now.after(*delay_ms));
                actions.push(Deferred::TimerArmed);
                actions.push(Deferred::Send {
                    ifidx,
                    pkt: flushed,
                });
                TxVerdict::Consumed
            }
            HoldOutcome::Stale { dropped, .. } => {
                stats.acks_reordered += 1;
                actions.push(Deferred::Free {
                    pkt: dropped,
                    send_q: true,
                });
                TxVerdict::Consumed
            }
            HoldOutcome::Full(pkt) => TxVerdict::Send(pkt),
        }
    }

    fn record(&mut self, hdr: &TcpFrame, now: Tick) -> bool {
        let SupState {
            mode,
            module,
            stats,
            ..
        } = self;
        let Some(d) = module.as_mut().and_then(|m| m.delay.as_mut()) else {
            invariant_violation(format!("no data flow table in mode {mode}"));
            return false;
        };
        let res = d
            .flows
            .record_segment(&mut d.pool, hdr.flow, hdr.end_seq(), now);
        stats.flows_aged += d.flows.take_aged() as u64;
        match res {
            Ok(()) => {
                stats.segs_recorded += 1;
                true
            }
            Err(e) => {
                debug!(error = %e, flow = %hdr.flow, "放弃跟踪 PSH 数据段");
                stats.segs_dropped += 1;
                false
            }
        }
    }
}

/// TCP ACK 抑制模块
pub struct TcpAckSup {
    bus: Arc<dyn Bus>,
    clock: Arc<dyn Clock>,
    bus_kind: BusKind,
    limits: Limits,
    inner: Mutex<SupState>,
    // 正在驱动 run_timers 的线程；布防新定时器后唤醒它重新计算睡眠时间
    timer_waker: Mutex<Option<Thread>>,
}

impl fmt::Debug for TcpAckSup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpAckSup")
            .field("bus_kind", &self.bus_kind)
            .field("limits", &self.limits)
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl TcpAckSup {
    /// 创建模块，并按配置切换到初始模式
    pub fn new(cfg: &SupConfig, bus: Arc<dyn Bus>, clock: Arc<dyn Clock>) -> Result<Self, SupError> {
        cfg.limits.validate()?;
        let sup = Self {
            bus,
            clock,
            bus_kind: cfg.bus,
            limits: cfg.limits,
            inner: Mutex::new(SupState {
                mode: SupMode::Off,
                ratio: cfg.limits.hold_ratio,
                delay_ms: cfg.limits.hold_delay_ms,
                module: None,
                stats: SupStats::default(),
            }),
            timer_waker: Mutex::new(None),
        };
        if cfg.mode != SupMode::Off {
            sup.set_mode(cfg.mode)?;
        }
        Ok(sup)
    }

    fn lock(&self) -> MutexGuard<'_, SupState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, actions: Vec<Deferred>) {
        for action in actions {
            match action {
                Deferred::Send { ifidx, pkt } => self.bus.send_pkt(ifidx, pkt),
                Deferred::Free { pkt, send_q } => self.bus.free_pkt(pkt, send_q),
                Deferred::TxInRx(enabled) => self.bus.set_tx_in_rx(enabled),
                Deferred::TimerArmed => self.wake_timer(),
            }
        }
    }

    /// 登记（或注销）驱动定时器的线程
    pub(crate) fn set_timer_waker(&self, waker: Option<Thread>) {
        *self
            .timer_waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = waker;
    }

    fn wake_timer(&self) {
        let waker = self.timer_waker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(thread) = waker.as_ref() {
            thread.unpark();
        }
    }

    /// 切换抑制模式。非 OFF 模式之间的切换也会先完整拆除旧状态再重建。
    #[tracing::instrument(skip(self), fields(bus = ?self.bus_kind))]
    pub fn set_mode(&self, mode: SupMode) -> Result<ModeChange, SupError> {
        let mut actions = Vec::new();
        let res = self.set_mode_locked(&mut self.lock(), mode, &mut actions);
        self.flush(actions);
        res
    }

    /// 以驱动配置接口的整数编码切换模式
    pub fn set_mode_raw(&self, raw: u32) -> Result<ModeChange, SupError> {
        let mode = SupMode::try_from(raw).inspect_err(|e| warn!(raw, error = %e, "非法模式"))?;
        self.set_mode(mode)
    }

    fn set_mode_locked(
        &self,
        st: &mut SupState,
        mode: SupMode,
        actions: &mut Vec<Deferred>,
    ) -> Result<ModeChange, SupError> {
        if st.mode == mode {
            warn!(%mode, "模式已经是目标值");
            return Ok(ModeChange::AlreadySet(mode));
        }
        if !mode.allowed_on(self.bus_kind) {
            warn!(%mode, "当前总线不支持该模式");
            return Err(SupError::BadArgument(format!(
                "mode {mode} not supported on {:?} bus",
                self.bus_kind
            )));
        }

        let from = st.mode;
        info!(%from, to = %mode, "切换 ACK 抑制模式");
        if let Some(module) = st.module.take() {
            if let Err(e) = module.teardown(actions) {
                warn!(error = %e, "拆除模块状态时发现不一致");
            }
        }
        st.mode = mode;
        if mode == SupMode::Off {
            return Ok(ModeChange::Switched { from, to: mode });
        }

        match SupModule::build(mode, &self.limits) {
            Ok(module) => st.module = Some(module),
            Err(e) => {
                error!(error = %e, %mode, "模式激活失败，回退到 OFF");
                st.mode = SupMode::Off;
                return Err(e);
            }
        }
        match mode {
            SupMode::Hold => {
                st.ratio = self.limits.hold_ratio;
                st.delay_ms = self.limits.hold_delay_ms;
            }
            SupMode::DelayTx => actions.push(Deferred::TxInRx(false)),
            _ => {}
        }
        Ok(ModeChange::Switched { from, to: mode })
    }

    pub fn mode(&self) -> SupMode {
        self.lock().mode
    }

    pub fn bus_kind(&self) -> BusKind {
        self.bus_kind
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// 设置 HOLD 抑制比；1 表示不持有
    pub fn set_hold_ratio(&self, ratio: u32) -> Result<(), SupError> {
        if ratio == 0 {
            return Err(SupError::BadArgument("hold ratio must be >= 1".into()));
        }
        self.lock().ratio = ratio;
        Ok(())
    }

    pub fn hold_ratio(&self) -> u32 {
        self.lock().ratio
    }

    /// 设置 HOLD 持有时间（毫秒），对之后布防的定时器生效
    pub fn set_hold_delay(&self, delay_ms: u64) {
        self.lock().delay_ms = delay_ms;
    }

    pub fn hold_delay_ms(&self) -> u64 {
        self.lock().delay_ms
    }

    pub fn stats(&self) -> SupStats {
        self.lock().stats
    }

    /// 发送路径入口：报文即将进入发送队列。
    ///
    /// 纯 ACK 按当前模式交给 ACK 表；DELAY_TRANSMIT 下带 PSH 的数据段记入数据流表。
    /// 其余报文（以及所有无法识别的帧）原样放行。
    pub fn on_tx(&self, pkt: Packet, ifidx: usize) -> TxVerdict {
        let frame_len = pkt.len();
        let Some(hdr) = pkt.with_data(TcpFrame::parse) else {
            trace!(pkt = pkt.id(), frame_len, "非 IPv4/TCP 帧，放行");
            return TxVerdict::Send(pkt);
        };
        let now = self.clock.now();
        let mut actions = Vec::new();

        let verdict = {
            let mut guard = self.lock();
            let st = &mut *guard;
            if hdr.is_pure_ack() && ack_sized(frame_len) {
                trace!(pkt = pkt.id(), flow = %hdr.flow, ack = hdr.ack, "纯 TCP ACK");
                match st.mode {
                    SupMode::Off => TxVerdict::Send(pkt),
                    SupMode::Replace | SupMode::DelayTx => st.suppress(pkt, &hdr, &mut actions),
                    SupMode::Hold => st.hold(pkt, &hdr, ifidx, now, &mut actions),
                }
            } else {
                if st.mode == SupMode::DelayTx && hdr.is_psh_data() {
                    st.record(&hdr, now);
                }
                TxVerdict::Send(pkt)
            }
        };

        self.flush(actions);
        verdict
    }

    /// 接收路径入口：DELAY_TRANSMIT 下记录对端发来的 PSH 数据段。记录成功返回 true。
    pub fn on_rx(&self, pkt: &Packet) -> bool {
        let Some(hdr) = pkt.with_data(TcpFrame::parse) else {
            return false;
        };
        if !hdr.is_psh_data() {
            return false;
        }
        let now = self.clock.now();
        let mut st = self.lock();
        if st.mode != SupMode::DelayTx {
            return false;
        }
        st.record(&hdr, now)
    }

    /// 发送队列通知：某个报文已真正离开队列。仅 SUPPRESS/DELAY_TRANSMIT 使用。
    pub fn on_xmit(&self, pkt: &Packet) -> bool {
        if !ack_sized(pkt.len()) {
            return false;
        }
        let mut st = self.lock();
        match st.module.as_mut().map(|m| &mut m.acks) {
            Some(AckTable::Replace(table)) => table.remove_packet(pkt),
            _ => false,
        }
    }

    /// 清空 ACK 表但不改变模式。HOLD 下持有的报文被释放、定时器被取消。
    pub fn clean(&self) {
        let mut actions = Vec::new();
        {
            let mut st = self.lock();
            match st.module.as_mut().map(|m| &mut m.acks) {
                Some(AckTable::Hold { table, timers }) => {
                    timers.cancel_all();
                    for entry in table.drain() {
                        actions.push(Deferred::Free {
                            pkt: entry.pkt,
                            send_q: true,
                        });
                    }
                }
                Some(AckTable::Replace(table)) => table.clear(),
                None => {}
            }
        }
        debug!(released = actions.len(), "清空 ACK 表");
        self.flush(actions);
    }

    /// 槽定时器回调：发送所有到期槽中持有的 ACK，返回发送个数。
    pub fn run_timers(&self) -> usize {
        let now = self.clock.now();
        let mut actions = Vec::new();
        {
            let mut guard = self.lock();
            let SupState { module, stats, .. } = &mut *guard;
            if let Some(AckTable::Hold { table, timers }) = module.as_mut().map(|m| &mut m.acks) {
                while let Some(slot) = timers.pop_expired(now) {
                    let Some(entry) = table.take(slot) else {
                        continue;
                    };
                    debug!(slot, pkt = entry.pkt.id(), ack = entry.hdr.ack, "定时器到期，发送持有的 ACK");
                    stats.timer_releases += 1;
                    actions.push(Deferred::Send {
                        ifidx: entry.ifidx,
                        pkt: entry.pkt,
                    });
                }
            }
        }
        let fired = actions.len();
        self.flush(actions);
        fired
    }

    /// 最早的槽定时器截止时间
    pub fn next_timer_deadline(&self) -> Option<Tick> {
        let mut st = self.lock();
        match st.module.as_mut().map(|m| &mut m.acks) {
            Some(AckTable::Hold { timers, .. }) => timers.next_deadline(),
            _ => None,
        }
    }

    /// 距最早截止时间还有多少毫秒
    pub fn next_timer_in(&self) -> Option<u64> {
        let deadline = self.next_timer_deadline()?;
        Some(deadline.since(self.clock.now()))
    }

    pub fn armed_timers(&self) -> usize {
        match self.lock().module.as_ref().map(|m| &m.acks) {
            Some(AckTable::Hold { timers, .. }) => timers.armed_count(),
            _ => 0,
        }
    }

    /// ACK 表中当前的表项数
    pub fn ack_table_len(&self) -> usize {
        match self.lock().module.as_ref().map(|m| &m.acks) {
            Some(AckTable::Replace(table)) => table.len(),
            Some(AckTable::Hold { table, .. }) => table.occupied(),
            None => 0,
        }
    }

    /// SUPPRESS/DELAY_TRANSMIT 下的表项快照
    pub fn queued_acks(&self) -> Vec<AckEntry> {
        match self.lock().module.as_ref().map(|m| &m.acks) {
            Some(AckTable::Replace(table)) => table.entries().to_vec(),
            _ => Vec::new(),
        }
    }

    /// HOLD 下某个槽的快照
    pub fn hold_slot(&self, slot: usize) -> Option<AckEntry> {
        match self.lock().module.as_ref().map(|m| &m.acks) {
            Some(AckTable::Hold { table, .. }) => table.slot(slot).cloned(),
            _ => None,
        }
    }

    pub fn data_flow_count(&self) -> usize {
        self.lock()
            .module
            .as_ref()
            .and_then(|m| m.delay.as_ref())
            .map_or(0, |d| d.flows.len())
    }

    /// 记录池中空闲记录数；不在 DELAY_TRANSMIT 时为 None
    pub fn free_segments(&self) -> Option<usize> {
        self.lock()
            .module
            .as_ref()
            .and_then(|m| m.delay.as_ref())
            .map(|d| d.pool.free_count())
    }

    /// 某条数据方向四元组上尚未被确认的 PSH 段末尾序号
    pub fn outstanding_segments(&self, data_flow: &FlowTuple) -> Option<Vec<u32>> {
        let st = self.lock();
        let d = st.module.as_ref()?.delay.as_ref()?;
        d.flows.outstanding(&d.pool, data_flow)
    }
}

impl Drop for TcpAckSup {
    fn drop(&mut self) {
        let st = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        let Some(module) = st.module.take() else {
            return;
        };
        st.mode = SupMode::Off;
        let mut actions = Vec::new();
        if let Err(e) = module.teardown(&mut actions) {
            warn!(error = %e, "析构时拆除模块状态发现不一致");
        }
        self.flush(actions);
    }
}
