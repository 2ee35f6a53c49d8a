//! 报文解析模块
//!
//! 只做 TCP ACK 抑制需要的最小解析：Ethernet（可选一层 802.1Q）→ IPv4 → TCP。
//! 所有多字节字段均为网络字节序。

mod builder;
mod flow;
mod frame;
mod seq;

pub use builder::FrameSpec;
pub use flow::FlowTuple;
pub use frame::{
    ETHER_HDR_LEN, ETHER_TYPE_8021Q, ETHER_TYPE_IP, IP_PROT_TCP, IPV4_MIN_HEADER_LEN,
    TCP_FLAG_ACK, TCP_FLAG_FIN, TCP_FLAG_PSH, TCP_FLAG_RST, TCP_FLAG_SYN, TCP_MIN_HEADER_LEN,
    TCPACKSZMAX, TCPACKSZMIN, TcpFrame, VLAN_TAG_LEN, ack_sized,
};
pub use seq::{seq_ge, seq_gt};
