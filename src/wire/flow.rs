//! TCP 流四元组

use std::fmt;
use std::net::Ipv4Addr;

/// 单向 TCP 流标识：(源 IP, 目的 IP, 源端口, 目的端口)，保持网络字节序原样存储，按字节精确匹配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FlowTuple {
    pub src_ip: [u8; 4],
    pub dst_ip: [u8; 4],
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
}

impl FlowTuple {
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16) -> Self {
        Self {
            src_ip: src.octets(),
            dst_ip: dst.octets(),
            src_port: sport.to_be_bytes(),
            dst_port: dport.to_be_bytes(),
        }
    }

    /// 反方向的同一连接（数据 A→B 对应 ACK B→A）
    pub fn reversed(&self) -> Self {
        Self {
            src_ip: self.dst_ip,
            dst_ip: self.src_ip,
            src_port: self.dst_port,
            dst_port: self.src_port,
        }
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src_ip)
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst_ip)
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes(self.src_port)
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes(self.dst_port)
    }
}

impl fmt::Display for FlowTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src_addr(),
            self.src_port(),
            self.dst_addr(),
            self.dst_port()
        )
    }
}
