//! 以太网/IPv4/TCP 帧构造器
//!
//! 回放工具和测试用它从描述生成字节级帧；驱动路径本身不构造报文。

use std::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};
use serde::{Deserialize, Serialize};

use super::frame::{
    ETHER_HDR_LEN, ETHER_TYPE_8021Q, ETHER_TYPE_IP, IP_PROT_TCP, IPV4_MIN_HEADER_LEN,
    TCP_FLAG_ACK, TCP_FLAG_PSH, TCP_MIN_HEADER_LEN, VLAN_TAG_LEN,
};

const SRC_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
const DST_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];
const TCP_OPT_NOP: u8 = 0x01;

fn default_flags() -> u8 {
    TCP_FLAG_ACK
}

/// 一个 TCP 帧的描述（JSON 中 `src`/`dst` 写成点分十进制字符串）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub sport: u16,
    pub dport: u16,
    #[serde(default)]
    pub seq: u32,
    #[serde(default)]
    pub ack: u32,
    #[serde(default = "default_flags")]
    pub flags: u8,
    #[serde(default)]
    pub payload_len: u16,
    /// TCP 选项字节数，向上取整到 4 的倍数，用 NOP 填充
    #[serde(default)]
    pub tcp_options_len: u8,
    #[serde(default)]
    pub vlan: Option<u16>,
}

impl FrameSpec {
    /// 不带载荷的纯 ACK
    pub fn ack(src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16, ack: u32) -> Self {
        Self {
            src,
            dst,
            sport,
            dport,
            seq: 0,
            ack,
            flags: TCP_FLAG_ACK,
            payload_len: 0,
            tcp_options_len: 0,
            vlan: None,
        }
    }

    /// 带 PSH|ACK 的数据段
    pub fn psh_data(
        src: Ipv4Addr,
        dst: Ipv4Addr,
        sport: u16,
        dport: u16,
        seq: u32,
        payload_len: u16,
    ) -> Self {
        Self {
            src,
            dst,
            sport,
            dport,
            seq,
            ack: 0,
            flags: TCP_FLAG_PSH | TCP_FLAG_ACK,
            payload_len,
            tcp_options_len: 0,
            vlan: None,
        }
    }

    pub fn with_options(mut self, len: u8) -> Self {
        self.tcp_options_len = len;
        self
    }

    pub fn with_vlan(mut self, vid: u16) -> Self {
        self.vlan = Some(vid);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let opts = usize::from(self.tcp_options_len).div_ceil(4) * 4;
        let tcp_hdr_len = (TCP_MIN_HEADER_LEN + opts).min(60);
        let ip_total_len = IPV4_MIN_HEADER_LEN + tcp_hdr_len + usize::from(self.payload_len);
        let l2_len = ETHER_HDR_LEN + if self.vlan.is_some() { VLAN_TAG_LEN } else { 0 };
        let mut buf = vec![0u8; l2_len + ip_total_len];

        buf[0..6].copy_from_slice(&DST_MAC);
        buf[6..12].copy_from_slice(&SRC_MAC);
        match self.vlan {
            Some(vid) => {
                NetworkEndian::write_u16(&mut buf[12..14], ETHER_TYPE_8021Q);
                NetworkEndian::write_u16(&mut buf[14..16], vid & 0x0fff);
                NetworkEndian::write_u16(&mut buf[16..18], ETHER_TYPE_IP);
            }
            None => NetworkEndian::write_u16(&mut buf[12..14], ETHER_TYPE_IP),
        }

        let ip = &mut buf[l2_len..];
        ip[0] = 0x45;
        NetworkEndian::write_u16(&mut ip[2..4], ip_total_len as u16);
        NetworkEndian::write_u16(&mut ip[6..8], 0x4000); // DF
        ip[8] = 64;
        ip[9] = IP_PROT_TCP;
        ip[12..16].copy_from_slice(&self.src.octets());
        ip[16..20].copy_from_slice(&self.dst.octets());
        let csum = ipv4_checksum(&ip[..IPV4_MIN_HEADER_LEN]);
        NetworkEndian::write_u16(&mut ip[10..12], csum);

        let tcp = &mut ip[IPV4_MIN_HEADER_LEN..];
        NetworkEndian::write_u16(&mut tcp[0..2], self.sport);
        NetworkEndian::write_u16(&mut tcp[2..4], self.dport);
        NetworkEndian::write_u32(&mut tcp[4..8], self.seq);
        NetworkEndian::write_u32(&mut tcp[8..12], self.ack);
        tcp[12] = ((tcp_hdr_len / 4) as u8) << 4;
        tcp[13] = self.flags;
        NetworkEndian::write_u16(&mut tcp[14..16], 0xffff);
        tcp[TCP_MIN_HEADER_LEN..tcp_hdr_len].fill(TCP_OPT_NOP);

        buf
    }
}

fn ipv4_checksum(hdr: &[u8]) -> u16 {
    let mut sum: u32 = hdr
        .chunks(2)
        .map(|c| u32::from(NetworkEndian::read_u16(c)))
        .sum();
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
