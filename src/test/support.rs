use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::bus::{Packet, RecordingBus};
use crate::sup::{SupConfig, SupMode, TcpAckSup};
use crate::timer::{ManualClock, Tick};
use crate::wire::{FlowTuple, FrameSpec};

pub const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const PEER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub const LOCAL_PORT: u16 = 5000;
pub const PEER_PORT: u16 = 80;

/// 本机发给对端的纯 ACK
pub fn ack_spec(ack: u32) -> FrameSpec {
    FrameSpec::ack(LOCAL, PEER, LOCAL_PORT, PEER_PORT, ack)
}

pub fn ack_pkt(id: u64, ack: u32) -> Packet {
    Packet::new(id, ack_spec(ack).build())
}

/// 另一条连接上的纯 ACK（本机端口不同）
pub fn ack_pkt_on(id: u64, local_port: u16, ack: u32) -> Packet {
    Packet::new(
        id,
        FrameSpec::ack(LOCAL, PEER, local_port, PEER_PORT, ack).build(),
    )
}

/// 对端发给本机的 PSH 数据段
pub fn psh_spec(seq: u32, len: u16) -> FrameSpec {
    FrameSpec::psh_data(PEER, LOCAL, PEER_PORT, LOCAL_PORT, seq, len)
}

pub fn psh_pkt(id: u64, seq: u32, len: u16) -> Packet {
    Packet::new(id, psh_spec(seq, len).build())
}

/// 数据方向的四元组（对端 -> 本机）
pub fn data_flow() -> FlowTuple {
    FlowTuple::new(PEER, LOCAL, PEER_PORT, LOCAL_PORT)
}

/// ACK 方向的四元组（本机 -> 对端）
pub fn ack_flow() -> FlowTuple {
    FlowTuple::new(LOCAL, PEER, LOCAL_PORT, PEER_PORT)
}

pub fn ack_of(pkt: &Packet) -> u32 {
    pkt.with_data(crate::wire::TcpFrame::parse)
        .expect("tcp frame")
        .ack
}

pub struct Harness {
    pub sup: TcpAckSup,
    pub bus: Arc<RecordingBus>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(mode: SupMode) -> Harness {
    harness_with(SupConfig {
        mode,
        ..SupConfig::default()
    })
}

pub fn harness_with(cfg: SupConfig) -> Harness {
    let bus = Arc::new(RecordingBus::default());
    let clock = Arc::new(ManualClock::new(Tick::ZERO));
    let sup = TcpAckSup::new(&cfg, bus.clone(), clock.clone()).expect("create sup");
    Harness { sup, bus, clock }
}
