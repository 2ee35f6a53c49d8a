//! 帧分类
//!
//! 把出/入方向的以太网帧解析成 [`TcpFrame`]。任何不认识的帧（非 IPv4、非 TCP、被截断）
//! 都返回 `None`，调用方按“原样放行”处理，这不是错误。

use std::ops::Range;

use byteorder::{ByteOrder, NetworkEndian};

use super::flow::FlowTuple;

pub const ETHER_HDR_LEN: usize = 14;
pub const VLAN_TAG_LEN: usize = 4;
pub const ETHER_TYPE_IP: u16 = 0x0800;
pub const ETHER_TYPE_8021Q: u16 = 0x8100;

pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const IP_PROT_TCP: u8 = 6;
const IP_VER_4: u8 = 4;

pub const TCP_MIN_HEADER_LEN: usize = 20;

pub const TCP_FLAG_FIN: u8 = 0x01;
pub const TCP_FLAG_SYN: u8 = 0x02;
pub const TCP_FLAG_RST: u8 = 0x04;
pub const TCP_FLAG_PSH: u8 = 0x08;
pub const TCP_FLAG_ACK: u8 = 0x10;

/// 可能是纯 ACK 的最短帧
pub const TCPACKSZMIN: usize = ETHER_HDR_LEN + IPV4_MIN_HEADER_LEN + TCP_MIN_HEADER_LEN;
/// 参与 ACK 处理的最长帧
pub const TCPACKSZMAX: usize = TCPACKSZMIN + 100;

mod field {
    use std::ops::Range;

    pub const ETHER_TYPE: Range<usize> = 12..14;
    pub const VLAN_INNER_TYPE: Range<usize> = 16..18;

    pub const IP_VER_IHL: usize = 0;
    pub const IP_LENGTH: Range<usize> = 2..4;
    pub const IP_PROTOCOL: usize = 9;
    pub const IP_SRC_ADDR: Range<usize> = 12..16;
    pub const IP_DST_ADDR: Range<usize> = 16..20;

    pub const TCP_SRC_PORT: Range<usize> = 0..2;
    pub const TCP_DST_PORT: Range<usize> = 2..4;
    pub const TCP_SEQ_NUM: Range<usize> = 4..8;
    pub const TCP_ACK_NUM: Range<usize> = 8..12;
    pub const TCP_HLEN: usize = 12;
    pub const TCP_FLAGS: usize = 13;
}

/// 帧长度是否落在 ACK 处理的快速筛选范围内
#[inline]
pub fn ack_sized(frame_len: usize) -> bool {
    (TCPACKSZMIN..=TCPACKSZMAX).contains(&frame_len)
}

/// 解析出的 IPv4/TCP 头部视图。
///
/// `l3_off` 是 IPv4 头在帧内的偏移，用于后续原地改写头部而无需重新走以太网层。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpFrame {
    pub l3_off: usize,
    pub ip_hdr_len: usize,
    pub ip_total_len: usize,
    pub tcp_hdr_len: usize,
    pub flow: FlowTuple,
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
}

impl TcpFrame {
    pub fn parse(frame: &[u8]) -> Option<TcpFrame> {
        let ether_type = NetworkEndian::read_u16(frame.get(field::ETHER_TYPE)?);
        let (l3_off, ether_type) = match ether_type {
            ETHER_TYPE_8021Q => (
                ETHER_HDR_LEN + VLAN_TAG_LEN,
                NetworkEndian::read_u16(frame.get(field::VLAN_INNER_TYPE)?),
            ),
            other => (ETHER_HDR_LEN, other),
        };
        if ether_type != ETHER_TYPE_IP {
            return None;
        }

        let ip = frame.get(l3_off..)?;
        if ip.len() < IPV4_MIN_HEADER_LEN {
            return None;
        }
        let ver_ihl = ip[field::IP_VER_IHL];
        let ip_hdr_len = usize::from(ver_ihl & 0x0f) * 4;
        if ver_ihl >> 4 != IP_VER_4 || ip_hdr_len < IPV4_MIN_HEADER_LEN {
            return None;
        }
        if ip[field::IP_PROTOCOL] != IP_PROT_TCP {
            return None;
        }

        let tcp = ip.get(ip_hdr_len..)?;
        if tcp.len() < TCP_MIN_HEADER_LEN {
            return None;
        }
        let tcp_hdr_len = usize::from(tcp[field::TCP_HLEN] >> 4) * 4;
        if tcp_hdr_len < TCP_MIN_HEADER_LEN || tcp.len() < tcp_hdr_len {
            return None;
        }
        let ip_total_len = usize::from(NetworkEndian::read_u16(&ip[field::IP_LENGTH]));
        if ip_total_len < ip_hdr_len + tcp_hdr_len {
            return None;
        }

        let mut flow = FlowTuple::default();
        flow.src_ip.copy_from_slice(&ip[field::IP_SRC_ADDR]);
        flow.dst_ip.copy_from_slice(&ip[field::IP_DST_ADDR]);
        flow.src_port.copy_from_slice(&tcp[field::TCP_SRC_PORT]);
        flow.dst_port.copy_from_slice(&tcp[field::TCP_DST_PORT]);

        Some(TcpFrame {
            l3_off,
            ip_hdr_len,
            ip_total_len,
            tcp_hdr_len,
            flow,
            seq: NetworkEndian::read_u32(&tcp[field::TCP_SEQ_NUM]),
            ack: NetworkEndian::read_u32(&tcp[field::TCP_ACK_NUM]),
            flags: tcp[field::TCP_FLAGS],
        })
    }

    pub fn payload_len(&self) -> usize {
        self.ip_total_len
            .saturating_sub(self.ip_hdr_len + self.tcp_hdr_len)
    }

    /// 标志位恰好只有 ACK，且不带载荷
    pub fn is_pure_ack(&self) -> bool {
        self.flags == TCP_FLAG_ACK && self.payload_len() == 0
    }

    /// 带 PSH 且有载荷的数据段
    pub fn is_psh_data(&self) -> bool {
        self.flags & TCP_FLAG_PSH != 0 && self.payload_len() > 0
    }

    /// 数据段末尾序号（seq + 载荷长度，回绕）
    pub fn end_seq(&self) -> u32 {
        self.seq.wrapping_add(self.payload_len() as u32)
    }

    /// 仅由 IPv4+TCP 头组成时，这就是整个三层报文在帧内的范围
    pub fn l3_range(&self) -> Range<usize> {
        self.l3_off..self.l3_off + self.ip_total_len
    }

    /// 两个头部的 IP/TCP 头长度是否逐字节可替换
    pub fn same_header_layout(&self, other: &TcpFrame) -> bool {
        self.ip_hdr_len == other.ip_hdr_len && self.tcp_hdr_len == other.tcp_hdr_len
    }
}
