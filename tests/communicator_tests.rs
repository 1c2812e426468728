mod util;

use mesh_sweep::algs::communicator::{
    CommTag, Communicator, ExchangeTags, NoComm, RayonComm, Wait,
};
use mesh_sweep::algs::exchange::{all_reduce_max, post_sized, recv_sized};
use mesh_sweep::sweep_error::SweepError;
use serial_test::serial;
use util::run_ranks;

#[test]
#[serial]
fn rayon_round_trip() {
    let tag = CommTag::new(0x1000);
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);

    let msg = b"hello";
    c0.isend(1, tag.as_u16(), msg);

    let mut buf = [0u8; 5];
    let got = c1.irecv(0, tag.as_u16(), &mut buf).wait().unwrap();
    assert_eq!(&got, msg);
}

#[test]
#[serial]
fn rayon_fifo_order() {
    let tag = CommTag::new(0x1001);
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);

    for i in 0..10u8 {
        c0.isend(1, tag.as_u16(), &[i]);
    }
    let mut out = Vec::new();
    for _ in 0..10 {
        let mut b = [0u8; 1];
        out.push(c1.irecv(0, tag.as_u16(), &mut b).wait().unwrap()[0]);
    }
    assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
}

#[test]
#[serial]
fn iprobe_sees_pending_length_without_consuming() {
    let tag = CommTag::new(0x1002);
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);

    assert_eq!(c1.iprobe(0, tag.as_u16()), None);
    c0.isend(1, tag.as_u16(), &[1, 2, 3]);
    assert_eq!(c1.iprobe(0, tag.as_u16()), Some(3));
    assert_eq!(c1.iprobe(0, tag.as_u16()), Some(3));
    let mut b = [0u8; 3];
    c1.irecv(0, tag.as_u16(), &mut b).wait();
    assert_eq!(c1.iprobe(0, tag.as_u16()), None);
}

#[test]
fn worlds_do_not_share_mailboxes() {
    let tag = 0x1003;
    let a = RayonComm::world(2);
    let b = RayonComm::world(2);
    a[0].isend(1, tag, &[7]);
    assert_eq!(b[1].iprobe(0, tag), None);
    assert_eq!(a[1].iprobe(0, tag), Some(1));
}

#[test]
fn checked_tag_offset_stops_before_the_barrier_tag() {
    let t = CommTag::new(0xFFF0);
    assert_eq!(t.checked_offset(0x0E).map(CommTag::as_u16), Some(0xFFFE));
    assert_eq!(t.checked_offset(0x0F), None);
    assert_eq!(CommTag::new(u16::MAX).offset(1).as_u16(), 0);
}

#[test]
fn sized_exchange_round_trips_across_ranks() {
    let tags = ExchangeTags::from_base(CommTag::new(0x2000));
    let got = run_ranks(2, |comm| {
        let peer = 1 - comm.rank();
        let payload: Vec<u8> = (0..(comm.rank() as u8 + 3)).collect();
        let sends = post_sized(&comm, peer, tags, payload.len(), &payload);
        let received = recv_sized(&comm, peer, tags, 1).unwrap();
        for s in sends {
            s.wait();
        }
        comm.barrier();
        received
    });
    assert_eq!(got[0], vec![0, 1, 2, 3]);
    assert_eq!(got[1], vec![0, 1, 2]);
}

#[test]
fn short_payload_is_a_length_mismatch() {
    let tags = ExchangeTags::from_base(CommTag::new(0x2020));
    let comms = RayonComm::world(2);
    // announces two 4-byte records, carries one
    post_sized(&comms[0], 1, tags, 2, &[0u8; 4]);
    let err = recv_sized(&comms[1], 0, tags, 4).unwrap_err();
    assert!(matches!(
        err,
        SweepError::WireLengthMismatch { neighbor: 0, expected: 8, got: 4 }
    ));
}

#[test]
fn reduce_max_agrees_on_every_rank() {
    let tags = ExchangeTags::from_base(CommTag::new(0x2010));
    let got = run_ranks(4, |comm| all_reduce_max(&comm, tags, 3 * comm.rank() + 1).unwrap());
    assert_eq!(got, vec![10; 4]);
}

#[test]
fn no_comm_is_a_single_rank() {
    assert_eq!(NoComm.rank(), 0);
    assert_eq!(NoComm.size(), 1);
    assert_eq!(NoComm.iprobe(0, 1), None);
    NoComm.barrier();
}
