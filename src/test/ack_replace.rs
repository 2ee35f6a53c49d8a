use crate::bus::{Bus, BusCall, Packet};
use crate::sup::{Limits, MergeOutcome, ReplaceTable, SupConfig, SupMode, TxVerdict};
use crate::test::support::{ack_of, ack_pkt, ack_pkt_on, ack_spec, harness, harness_with};
use crate::wire::{TCP_FLAG_FIN, TcpFrame};

fn hdr(pkt: &Packet) -> TcpFrame {
    pkt.with_data(TcpFrame::parse).expect("tcp frame")
}

#[test]
fn newer_ack_overwrites_queued_ack_in_place() {
    let h = harness(SupMode::Replace);
    let first = ack_pkt(1, 100);
    let second = ack_pkt(2, 150);

    let queued = h.sup.on_tx(first.clone(), 0).into_packet().expect("first ack queued");
    assert!(queued.same(&first));
    assert_eq!(h.sup.ack_table_len(), 1);

    assert!(h.sup.on_tx(second.clone(), 0).is_consumed());
    assert_eq!(ack_of(&first), 150, "queued buffer now carries the newer ack");

    // 发送队列真正发出首个报文
    assert!(h.sup.on_xmit(&queued));
    h.bus.send_pkt(0, queued);
    assert_eq!(h.sup.ack_table_len(), 0);

    let sent = h.bus.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.id(), 1);
    assert_eq!(ack_of(&sent[0].1), 150);

    let freed = h.bus.freed();
    assert_eq!(freed.len(), 1);
    assert!(freed[0].0.same(&second));
    assert!(!freed[0].1, "replaced buffer is a quick free");

    let stats = h.sup.stats();
    assert_eq!(stats.acks_seen, 2);
    assert_eq!(stats.acks_queued, 1);
    assert_eq!(stats.acks_replaced, 1);
}

#[test]
fn duplicate_and_reordered_acks_are_sent_untouched() {
    let h = harness(SupMode::Replace);
    let first = ack_pkt(1, 500);
    assert!(!h.sup.on_tx(first.clone(), 0).is_consumed());

    let dup = h.sup.on_tx(ack_pkt(2, 500), 0);
    assert_eq!(dup.into_packet().map(|p| p.id()), Some(2));

    let old = h.sup.on_tx(ack_pkt(3, 400), 0);
    assert_eq!(old.into_packet().map(|p| p.id()), Some(3));

    assert_eq!(ack_of(&first), 500);
    assert!(h.bus.freed().is_empty());
    let stats = h.sup.stats();
    assert_eq!(stats.acks_duplicate, 1);
    assert_eq!(stats.acks_reordered, 1);
    assert_eq!(stats.acks_replaced, 0);
}

#[test]
fn header_length_mismatch_sends_both() {
    let h = harness(SupMode::Replace);
    let first = ack_pkt(1, 100);
    let with_opts = Packet::new(2, ack_spec(200).with_options(12).build());

    assert!(!h.sup.on_tx(first.clone(), 0).is_consumed());
    assert!(!h.sup.on_tx(with_opts, 0).is_consumed());
    assert_eq!(ack_of(&first), 100);
    assert_eq!(h.sup.stats().len_mismatch, 1);
    assert!(h.bus.calls().is_empty());
}

#[test]
fn full_table_lets_new_flows_through() {
    let h = harness_with(SupConfig {
        mode: SupMode::Replace,
        limits: Limits {
            ack_slots: 2,
            ..Limits::default()
        },
        ..SupConfig::default()
    });
    assert!(!h.sup.on_tx(ack_pkt_on(1, 6001, 10), 0).is_consumed());
    assert!(!h.sup.on_tx(ack_pkt_on(2, 6002, 10), 0).is_consumed());
    assert!(!h.sup.on_tx(ack_pkt_on(3, 6003, 10), 0).is_consumed());
    assert_eq!(h.sup.ack_table_len(), 2);
    assert_eq!(h.sup.stats().acks_queued, 2);
}

#[test]
fn xmit_removes_entry_and_backfills_with_last() {
    let h = harness(SupMode::Replace);
    let a = ack_pkt_on(1, 6001, 10);
    let b = ack_pkt_on(2, 6002, 10);
    let c = ack_pkt_on(3, 6003, 10);
    for p in [&a, &b, &c] {
        assert!(!h.sup.on_tx(p.clone(), 0).is_consumed());
    }

    assert!(h.sup.on_xmit(&a));
    assert!(!h.sup.on_xmit(&a), "already removed");
    let ids: Vec<u64> = h.sup.queued_acks().iter().map(|e| e.pkt.id()).collect();
    assert_eq!(ids, vec![3, 2]);

    // 已发出的流不再参与合并：新 ACK 重新入表
    assert!(!h.sup.on_tx(ack_pkt_on(4, 6001, 20), 0).is_consumed());
    assert_eq!(h.sup.ack_table_len(), 3);
}

#[test]
fn xmit_fast_rejects_by_length() {
    let h = harness(SupMode::Replace);
    let big = Packet::new(9, vec![0u8; 1500]);
    assert!(!h.sup.on_xmit(&big));
    let tiny = Packet::new(10, vec![0u8; 20]);
    assert!(!h.sup.on_xmit(&tiny));
}

#[test]
fn non_ack_traffic_bypasses_the_table() {
    let h = harness(SupMode::Replace);
    let garbage = Packet::new(1, vec![0xffu8; 60]);
    assert!(!h.sup.on_tx(garbage, 0).is_consumed());

    let mut spec = ack_spec(5);
    spec.payload_len = 10;
    assert!(!h.sup.on_tx(Packet::new(2, spec.build()), 0).is_consumed());

    let mut fin = ack_spec(5);
    fin.flags |= TCP_FLAG_FIN;
    assert!(matches!(
        h.sup.on_tx(Packet::new(3, fin.build()), 0),
        TxVerdict::Send(_)
    ));
    assert_eq!(h.sup.ack_table_len(), 0);
    assert_eq!(h.sup.stats().acks_seen, 0);
}

#[test]
fn off_mode_never_touches_packets() {
    let h = harness(SupMode::Off);
    assert!(!h.sup.on_tx(ack_pkt(1, 1), 0).is_consumed());
    assert!(!h.sup.on_tx(ack_pkt(2, 2), 0).is_consumed());
    assert!(!h.sup.on_xmit(&ack_pkt(1, 1)));
    assert!(h.bus.calls().is_empty());
    assert_eq!(h.sup.ack_table_len(), 0);
}

#[test]
fn replace_table_merge_outcomes() {
    let mut table = ReplaceTable::new(1).expect("table");
    let a = ack_pkt(1, 100);
    assert_eq!(
        table.try_merge_or_enqueue(&a, &hdr(&a)),
        MergeOutcome::Queued { idx: 0 }
    );
    let b = ack_pkt(2, 180);
    assert_eq!(
        table.try_merge_or_enqueue(&b, &hdr(&b)),
        MergeOutcome::Replaced {
            idx: 0,
            old_ack: 100,
            new_ack: 180
        }
    );
    assert_eq!(table.entries()[0].hdr.ack, 180);
    assert!(table.entries()[0].pkt.same(&a));

    let other = ack_pkt_on(3, 7000, 1);
    assert_eq!(
        table.try_merge_or_enqueue(&other, &hdr(&other)),
        MergeOutcome::Full
    );
    assert!(table.remove_packet(&a));
    assert!(table.is_empty());
}

#[test]
fn in_place_rewrite_keeps_vlan_offset_of_queued_frame() {
    let mut table = ReplaceTable::new(2).expect("table");
    let tagged = Packet::new(1, ack_spec(100).with_vlan(5).build());
    let plain = ack_pkt(2, 300);
    assert!(matches!(
        table.try_merge_or_enqueue(&tagged, &hdr(&tagged)),
        MergeOutcome::Queued { .. }
    ));
    assert!(matches!(
        table.try_merge_or_enqueue(&plain, &hdr(&plain)),
        MergeOutcome::Replaced { .. }
    ));
    let rewritten = hdr(&tagged);
    assert_eq!(rewritten.l3_off, 18);
    assert_eq!(rewritten.ack, 300);
    assert_eq!(table.entries()[0].hdr, rewritten);
}

#[test]
fn recording_bus_logs_replacement_free() {
    let h = harness(SupMode::Replace);
    assert!(!h.sup.on_tx(ack_pkt(1, 1), 0).is_consumed());
    assert!(h.sup.on_tx(ack_pkt(2, 2), 0).is_consumed());
    match h.bus.calls().as_slice() {
        [BusCall::Free { pkt, send_q: false }] => assert_eq!(pkt.id(), 2),
        other => panic!("unexpected bus calls: {other:?}"),
    }
}
