//! Wire-format tests against literal byte layouts and full-frame
//! round-trips, exercised through the public API only.

use async_agentx::pdu::{
    ByteOrder, ClosePdu, CloseReason, GetBulkPdu, GetPdu, HEADER_LEN, Header, OpenPdu, Pdu,
    PduPayload, RegisterPdu, ResponseError, ResponsePdu, SearchRange, TestSetPdu,
};
use async_agentx::{Oid, Value, VarBind, oid};
use bytes::Bytes;

#[test]
fn oid_parse_and_render() {
    let input = "1.3.6.1.4.1.12345";
    let oid = Oid::parse(input).unwrap();
    assert_eq!(oid.arcs(), &[1, 3, 6, 1, 4, 1, 12345]);
    assert_eq!(oid.to_string(), input);
}

#[test]
fn open_pdu_layout() {
    let pdu = Pdu::new(
        0,
        0,
        1,
        ByteOrder::Big,
        PduPayload::Open(OpenPdu::new(
            5,
            oid!(1, 3, 6, 1, 4, 1, 12345),
            &b"test"[..],
        )),
    );
    let frame = pdu.encode();

    // Header: version 1, type Open(1), NETWORK_BYTE_ORDER flag, reserved 0
    assert_eq!(frame[0], 1);
    assert_eq!(frame[1], 1);
    assert_eq!(frame[2] & 0x10, 0x10);
    assert_eq!(frame[3], 0);

    // Payload: 4 (timeout block) + 12 (compressed OID: 4 header + 2 * 4
    // subids after the 1.3.6.1.4 prefix) + 8 (octet string "test" padded)
    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(&frame[..HEADER_LEN]);
    let header = Header::decode(&raw).unwrap();
    assert_eq!(header.payload_length, 4 + 12 + 8);
    assert_eq!(frame.len(), HEADER_LEN + header.payload_length as usize);

    // Timeout byte leads the payload
    assert_eq!(frame[HEADER_LEN], 5);
    // OID block: n_subid 2, prefix 4 after internet compression
    assert_eq!(frame[HEADER_LEN + 4], 2);
    assert_eq!(frame[HEADER_LEN + 5], 4);
}

#[test]
fn open_pdu_little_endian_clears_flag() {
    let pdu = Pdu::new(
        0,
        0,
        1,
        ByteOrder::Little,
        PduPayload::Open(OpenPdu::new(5, oid!(1, 3, 6, 1, 4, 1, 12345), &b"test"[..])),
    );
    let frame = pdu.encode();
    assert_eq!(frame[2] & 0x10, 0);
    // payload_length is little-endian at offset 16
    assert_eq!(frame[16], 24);
    assert_eq!(&frame[17..20], &[0, 0, 0]);
}

#[test]
fn frame_roundtrip_every_payload_both_orders() {
    let payloads = vec![
        PduPayload::Open(OpenPdu::new(30, oid!(1, 3, 6, 1, 4, 1, 27108), &b"x"[..])),
        PduPayload::Close(ClosePdu::new(CloseReason::Timeouts)),
        PduPayload::Register(
            RegisterPdu::new(oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 1, 3), 64, 15).with_range(11, 1000),
        ),
        PduPayload::Get(GetPdu::new(vec![
            SearchRange::new(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Oid::empty(), false),
            SearchRange::new(oid!(1, 3, 6, 1, 2, 1, 1, 5, 0), Oid::empty(), false),
        ])),
        PduPayload::GetNext(GetPdu::new(vec![SearchRange::new(
            oid!(1, 3, 6, 1, 2, 1),
            oid!(1, 3, 6, 1, 2, 2),
            true,
        )])),
        PduPayload::GetBulk(GetBulkPdu::new(
            2,
            10,
            vec![
                SearchRange::unbounded(oid!(1, 3, 6, 1, 2, 1, 1), false),
                SearchRange::unbounded(oid!(1, 3, 6, 1, 2, 1, 2), false),
            ],
        )),
        PduPayload::TestSet(TestSetPdu::new(vec![
            VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 5, 0), Value::from("hostname")),
            VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 7, 0), Value::Integer(72)),
        ])),
        PduPayload::Response(ResponsePdu::success(
            123456,
            vec![
                VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::from("Linux")),
                VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 3, 0), Value::TimeTicks(5000)),
                VarBind::new(
                    oid!(1, 3, 6, 1, 2, 1, 4, 3, 0),
                    Value::Counter64(0x0123_4567_89ab_cdef),
                ),
                VarBind::new(oid!(1, 3, 6, 1, 2, 1, 4, 20), Value::IpAddress([10, 1, 2, 3])),
                VarBind::new(oid!(1, 3, 6, 1, 9), Value::EndOfMibView),
            ],
        )),
    ];

    for payload in payloads {
        for order in [ByteOrder::Big, ByteOrder::Little] {
            let pdu = Pdu::new(0xAABBCCDD, 0x11223344, 0x55667788, order, payload.clone());
            let frame = pdu.encode();
            let decoded = Pdu::decode(&frame).unwrap();
            assert_eq!(decoded, pdu, "order {:?}", order);
        }
    }
}

#[test]
fn response_error_wire_values() {
    let pdu = Pdu::new(
        1,
        2,
        3,
        ByteOrder::Big,
        PduPayload::Response(ResponsePdu::error(0, ResponseError::NotWritable, 2)),
    );
    let frame = pdu.encode();
    // error code 17 at payload offset 4, index 2 at offset 6
    assert_eq!(&frame[HEADER_LEN + 4..HEADER_LEN + 6], &[0, 17]);
    assert_eq!(&frame[HEADER_LEN + 6..HEADER_LEN + 8], &[0, 2]);
}

#[test]
fn decode_rejects_truncated_frame() {
    let pdu = Pdu::new(
        1,
        2,
        3,
        ByteOrder::Big,
        PduPayload::Response(ResponsePdu::success(
            0,
            vec![VarBind::new(oid!(1, 3, 6, 1), Value::Integer(1))],
        )),
    );
    let frame = pdu.encode();
    // Any prefix strictly inside the frame must fail, never panic
    for cut in 0..frame.len() {
        assert!(Pdu::decode(&frame[..cut]).is_err(), "cut at {}", cut);
    }
}

#[test]
fn decode_rejects_garbage() {
    assert!(Pdu::decode(&[]).is_err());
    assert!(Pdu::decode(&[0xFF; 64]).is_err());
    // Valid-looking header claiming a huge payload with no bytes behind it
    let mut frame = vec![0u8; HEADER_LEN];
    frame[0] = 1;
    frame[1] = 13; // Ping
    frame[2] = 0x10;
    frame[19] = 200;
    assert!(Pdu::decode(&frame).is_err());
}

#[test]
fn octet_string_values_pad_to_alignment() {
    for (text, payload_len) in [("", 4), ("a", 8), ("abcd", 8), ("abcde", 12)] {
        let pdu = Pdu::new(
            0,
            0,
            1,
            ByteOrder::Big,
            PduPayload::Response(ResponsePdu::success(
                0,
                vec![VarBind::new(
                    oid!(1, 3, 6, 2),
                    Value::OctetString(Bytes::copy_from_slice(text.as_bytes())),
                )],
            )),
        );
        let frame = pdu.encode();
        // varbind = 4 (tag block) + 20 (uncompressed 4-arc OID) + string
        let expected = 8 + 4 + 20 + payload_len;
        assert_eq!(
            frame.len() - HEADER_LEN,
            expected,
            "text {:?} total",
            text
        );
        let decoded = Pdu::decode(&frame).unwrap();
        assert_eq!(decoded, pdu);
    }
}
