use crate::test::support::{ack_flow, ack_spec, data_flow, psh_spec};
use crate::wire::{
    FrameSpec, TCP_FLAG_ACK, TCP_FLAG_SYN, TCPACKSZMAX, TCPACKSZMIN, TcpFrame, ack_sized, seq_ge,
    seq_gt,
};

#[test]
fn seq_compare_is_inclusive_and_handles_wraparound() {
    assert!(seq_ge(100, 100));
    assert!(!seq_gt(100, 100));
    assert!(seq_gt(101, 100));
    assert!(!seq_ge(99, 100));

    // 回绕：小数值在大数值“之后”
    assert!(seq_ge(5, u32::MAX - 5));
    assert!(seq_gt(5, u32::MAX - 5));
    assert!(!seq_ge(u32::MAX - 5, 5));
}

#[test]
fn seq_compare_half_space_boundary() {
    let end = 0xdead_0000_u32;
    assert!(seq_ge(end.wrapping_add((1 << 31) - 1), end));
    assert!(!seq_ge(end.wrapping_add(1 << 31), end));
    assert!(!seq_ge(end.wrapping_sub((1 << 31) - 1), end));
    assert!(seq_gt(end.wrapping_add(1 << 31), end));
}

#[test]
fn parse_pure_ack_frame() {
    let buf = ack_spec(1234).build();
    assert_eq!(buf.len(), TCPACKSZMIN);
    let hdr = TcpFrame::parse(&buf).expect("parse ack");
    assert_eq!(hdr.l3_off, 14);
    assert_eq!(hdr.ip_hdr_len, 20);
    assert_eq!(hdr.tcp_hdr_len, 20);
    assert_eq!(hdr.ack, 1234);
    assert_eq!(hdr.flags, TCP_FLAG_ACK);
    assert_eq!(hdr.flow, ack_flow());
    assert_eq!(hdr.payload_len(), 0);
    assert!(hdr.is_pure_ack());
    assert!(!hdr.is_psh_data());
}

#[test]
fn parse_psh_data_frame_and_end_seq_wraps() {
    let buf = psh_spec(u32::MAX - 9, 20).build();
    let hdr = TcpFrame::parse(&buf).expect("parse data");
    assert_eq!(hdr.flow, data_flow());
    assert_eq!(hdr.payload_len(), 20);
    assert!(hdr.is_psh_data());
    assert!(!hdr.is_pure_ack());
    assert_eq!(hdr.end_seq(), 10);
}

#[test]
fn parse_skips_one_vlan_tag_and_options() {
    let buf = ack_spec(7).with_vlan(42).with_options(12).build();
    let hdr = TcpFrame::parse(&buf).expect("parse vlan ack");
    assert_eq!(hdr.l3_off, 18);
    assert_eq!(hdr.tcp_hdr_len, 32);
    assert_eq!(hdr.ack, 7);
    assert!(hdr.is_pure_ack());
    assert_eq!(buf.len(), TCPACKSZMIN + 4 + 12);
}

#[test]
fn ack_with_other_flags_is_not_pure() {
    let mut spec = ack_spec(1);
    spec.flags = TCP_FLAG_ACK | TCP_FLAG_SYN;
    let hdr = TcpFrame::parse(&spec.build()).expect("parse syn-ack");
    assert!(!hdr.is_pure_ack());
}

#[test]
fn non_tcp_and_truncated_frames_are_rejected() {
    let mut buf = ack_spec(1).build();
    assert!(TcpFrame::parse(&buf[..30]).is_none(), "truncated ip header");
    assert!(TcpFrame::parse(&buf[..40]).is_none(), "truncated tcp header");
    assert!(TcpFrame::parse(&[]).is_none());

    buf[14 + 9] = 17; // UDP
    assert!(TcpFrame::parse(&buf).is_none());

    let mut arp = ack_spec(1).build();
    arp[12] = 0x08;
    arp[13] = 0x06;
    assert!(TcpFrame::parse(&arp).is_none());

    let mut v6 = ack_spec(1).build();
    v6[14] = 0x65;
    assert!(TcpFrame::parse(&v6).is_none());
}

#[test]
fn ack_size_window() {
    assert!(!ack_sized(TCPACKSZMIN - 1));
    assert!(ack_sized(TCPACKSZMIN));
    assert!(ack_sized(TCPACKSZMAX));
    assert!(!ack_sized(TCPACKSZMAX + 1));
}

#[test]
fn frame_spec_deserializes_with_defaults() {
    let spec: FrameSpec = serde_json::from_str(
        r#"{ "src": "10.0.0.1", "dst": "10.0.0.2", "sport": 5000, "dport": 80, "ack": 9 }"#,
    )
    .expect("parse frame spec");
    assert_eq!(spec, ack_spec(9));
}

#[test]
fn built_ipv4_header_checksum_verifies() {
    let buf = ack_spec(99).build();
    let ip = &buf[14..34];
    let sum: u32 = ip
        .chunks(2)
        .map(|c| u32::from(u16::from_be_bytes([c[0], c[1]])))
        .sum();
    let folded = (sum & 0xffff) + (sum >> 16);
    let folded = (folded & 0xffff) + (folded >> 16);
    assert_eq!(folded, 0xffff);
}
