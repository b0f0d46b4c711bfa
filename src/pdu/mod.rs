//! AgentX PDU codec (RFC 2741 Section 6).
//!
//! A [`Pdu`] pairs the 20-byte header fields every PDU carries (session,
//! transaction and packet ids) with a typed [`PduPayload`] body. Encoding
//! produces the complete frame; decoding is its strict inverse, so
//! `Pdu::decode(&pdu.encode()) == pdu` for every well-formed PDU.
//!
//! Byte order is a per-PDU property announced by the NETWORK_BYTE_ORDER
//! header flag. The subagent picks its native order for PDUs it originates
//! and mirrors the master's order on replies.

pub mod body;
pub mod wire;

pub use body::{
    AddAgentCapsPdu, ClosePdu, CloseReason, GetBulkPdu, GetPdu, IndexAllocatePdu,
    IndexDeallocatePdu, NotifyPdu, OpenPdu, PingPdu, RegisterPdu, RemoveAgentCapsPdu,
    ResponseError, ResponsePdu, TestSetPdu, UnregisterPdu,
};
pub use wire::ByteOrder;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolErrorKind, Error, Result};
use crate::oid::Oid;
use crate::varbind::VarBind;

use wire::{Reader, Writer};

/// Size of the fixed AgentX header.
pub const HEADER_LEN: usize = 20;

/// The protocol version this library implements.
pub const PROTOCOL_VERSION: u8 = 1;

/// AgentX PDU types (RFC 2741 Section 6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduType {
    Open = 1,
    Close = 2,
    Register = 3,
    Unregister = 4,
    Get = 5,
    GetNext = 6,
    GetBulk = 7,
    TestSet = 8,
    CommitSet = 9,
    UndoSet = 10,
    CleanupSet = 11,
    Notify = 12,
    Ping = 13,
    IndexAllocate = 14,
    IndexDeallocate = 15,
    AddAgentCaps = 16,
    RemoveAgentCaps = 17,
    Response = 18,
}

impl PduType {
    /// The protocol name of this PDU type.
    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "agentx-Open-PDU",
            Self::Close => "agentx-Close-PDU",
            Self::Register => "agentx-Register-PDU",
            Self::Unregister => "agentx-Unregister-PDU",
            Self::Get => "agentx-Get-PDU",
            Self::GetNext => "agentx-GetNext-PDU",
            Self::GetBulk => "agentx-GetBulk-PDU",
            Self::TestSet => "agentx-TestSet-PDU",
            Self::CommitSet => "agentx-CommitSet-PDU",
            Self::UndoSet => "agentx-UndoSet-PDU",
            Self::CleanupSet => "agentx-CleanupSet-PDU",
            Self::Notify => "agentx-Notify-PDU",
            Self::Ping => "agentx-Ping-PDU",
            Self::IndexAllocate => "agentx-IndexAllocate-PDU",
            Self::IndexDeallocate => "agentx-IndexDeallocate-PDU",
            Self::AddAgentCaps => "agentx-AddAgentCaps-PDU",
            Self::RemoveAgentCaps => "agentx-RemoveAgentCaps-PDU",
            Self::Response => "agentx-Response-PDU",
        }
    }
}

impl TryFrom<u8> for PduType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            1 => Ok(Self::Open),
            2 => Ok(Self::Close),
            3 => Ok(Self::Register),
            4 => Ok(Self::Unregister),
            5 => Ok(Self::Get),
            6 => Ok(Self::GetNext),
            7 => Ok(Self::GetBulk),
            8 => Ok(Self::TestSet),
            9 => Ok(Self::CommitSet),
            10 => Ok(Self::UndoSet),
            11 => Ok(Self::CleanupSet),
            12 => Ok(Self::Notify),
            13 => Ok(Self::Ping),
            14 => Ok(Self::IndexAllocate),
            15 => Ok(Self::IndexDeallocate),
            16 => Ok(Self::AddAgentCaps),
            17 => Ok(Self::RemoveAgentCaps),
            18 => Ok(Self::Response),
            other => Err(other),
        }
    }
}

bitflags::bitflags! {
    /// AgentX header flag bits (RFC 2741 Section 6.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        const INSTANCE_REGISTRATION = 0x01;
        const NEW_INDEX = 0x02;
        const ANY_INDEX = 0x04;
        const NON_DEFAULT_CONTEXT = 0x08;
        const NETWORK_BYTE_ORDER = 0x10;
    }
}

/// The fixed 20-byte AgentX header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub pdu_type: PduType,
    pub flags: Flags,
    pub session_id: u32,
    pub transaction_id: u32,
    pub packet_id: u32,
    pub payload_length: u32,
}

impl Header {
    /// The byte order announced by this header's flags.
    pub fn byte_order(&self) -> ByteOrder {
        if self.flags.contains(Flags::NETWORK_BYTE_ORDER) {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.version;
        buf[1] = self.pdu_type as u8;
        buf[2] = self.flags.bits();
        // buf[3] reserved, stays 0
        let words = [
            self.session_id,
            self.transaction_id,
            self.packet_id,
            self.payload_length,
        ];
        for (i, word) in words.iter().enumerate() {
            let raw = match self.byte_order() {
                ByteOrder::Big => word.to_be_bytes(),
                ByteOrder::Little => word.to_le_bytes(),
            };
            buf[4 + i * 4..8 + i * 4].copy_from_slice(&raw);
        }
        buf
    }

    /// Decode and validate a header.
    ///
    /// Rejects unknown versions, unknown PDU types and a nonzero reserved
    /// byte. The payload length is not bounds-checked here; the transport
    /// applies its allocation guard before reading the payload.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        if buf[0] != PROTOCOL_VERSION {
            return Err(Error::protocol(ProtocolErrorKind::UnsupportedVersion(buf[0])));
        }
        let pdu_type = PduType::try_from(buf[1])
            .map_err(|v| Error::protocol(ProtocolErrorKind::UnknownPduType(v)))?;
        let flags = Flags::from_bits_truncate(buf[2]);
        if buf[3] != 0 {
            return Err(Error::protocol(ProtocolErrorKind::ReservedNonZero));
        }

        let read_word = |offset: usize| {
            let raw = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
            if flags.contains(Flags::NETWORK_BYTE_ORDER) {
                u32::from_be_bytes(raw)
            } else {
                u32::from_le_bytes(raw)
            }
        };

        Ok(Self {
            version: buf[0],
            pdu_type,
            flags,
            session_id: read_word(4),
            transaction_id: read_word(8),
            packet_id: read_word(12),
            payload_length: read_word(16),
        })
    }

    /// The payload length declared in the raw header bytes, readable even
    /// when the header fails validation. Used to stay framed on a stream
    /// after a bad header.
    pub(crate) fn raw_payload_length(buf: &[u8; HEADER_LEN]) -> u32 {
        let raw = [buf[16], buf[17], buf[18], buf[19]];
        if buf[2] & Flags::NETWORK_BYTE_ORDER.bits() != 0 {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        }
    }
}

/// A GetNext/GetBulk traversal bound: a start OID with an include flag and
/// an end OID (empty = unbounded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRange {
    pub start: Oid,
    pub end: Oid,
    /// Whether `start` itself is a candidate result.
    pub include: bool,
}

impl SearchRange {
    pub fn new(start: Oid, end: Oid, include: bool) -> Self {
        Self {
            start,
            end,
            include,
        }
    }

    /// A range covering everything at or after `start`.
    pub fn unbounded(start: Oid, include: bool) -> Self {
        Self::new(start, Oid::empty(), include)
    }

    /// Whether the end bound is the unbounded sentinel.
    pub fn is_unbounded(&self) -> bool {
        self.end.is_empty()
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        w.put_oid(&self.start, self.include);
        w.put_oid(&self.end, false);
    }

    pub(crate) fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let (start, include) = r.read_oid()?;
        let (end, _) = r.read_oid()?;
        Ok(Self {
            start,
            end,
            include,
        })
    }
}

/// Encode a varbind list into one buffer, preserving input order.
///
/// Each varbind is encoded independently and the chunks are concatenated,
/// so the per-varbind work can be handed to a worker pool for large
/// Response payloads without changing the result.
pub fn encode_varbinds(varbinds: &[VarBind], order: ByteOrder) -> Bytes {
    let chunks: Vec<Bytes> = varbinds
        .iter()
        .map(|vb| {
            let mut w = Writer::new(order);
            vb.encode(&mut w);
            w.freeze()
        })
        .collect();

    let total: usize = chunks.iter().map(|c| c.len()).sum();
    let mut out = BytesMut::with_capacity(total);
    for chunk in chunks {
        out.put_slice(&chunk);
    }
    out.freeze()
}

/// A typed PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PduPayload {
    Open(OpenPdu),
    Close(ClosePdu),
    Register(RegisterPdu),
    Unregister(UnregisterPdu),
    Get(GetPdu),
    GetNext(GetPdu),
    GetBulk(GetBulkPdu),
    TestSet(TestSetPdu),
    CommitSet,
    UndoSet,
    CleanupSet,
    Notify(NotifyPdu),
    Ping(PingPdu),
    IndexAllocate(IndexAllocatePdu),
    IndexDeallocate(IndexDeallocatePdu),
    AddAgentCaps(AddAgentCapsPdu),
    RemoveAgentCaps(RemoveAgentCapsPdu),
    Response(ResponsePdu),
}

impl PduPayload {
    pub fn pdu_type(&self) -> PduType {
        match self {
            Self::Open(_) => PduType::Open,
            Self::Close(_) => PduType::Close,
            Self::Register(_) => PduType::Register,
            Self::Unregister(_) => PduType::Unregister,
            Self::Get(_) => PduType::Get,
            Self::GetNext(_) => PduType::GetNext,
            Self::GetBulk(_) => PduType::GetBulk,
            Self::TestSet(_) => PduType::TestSet,
            Self::CommitSet => PduType::CommitSet,
            Self::UndoSet => PduType::UndoSet,
            Self::CleanupSet => PduType::CleanupSet,
            Self::Notify(_) => PduType::Notify,
            Self::Ping(_) => PduType::Ping,
            Self::IndexAllocate(_) => PduType::IndexAllocate,
            Self::IndexDeallocate(_) => PduType::IndexDeallocate,
            Self::AddAgentCaps(_) => PduType::AddAgentCaps,
            Self::RemoveAgentCaps(_) => PduType::RemoveAgentCaps,
            Self::Response(_) => PduType::Response,
        }
    }

    /// Flag bits contributed by the body (context presence, registration
    /// and index-allocation modes).
    fn flags(&self) -> Flags {
        match self {
            Self::Register(b) => b.flags(),
            Self::Unregister(b) => b.flags(),
            Self::Get(b) | Self::GetNext(b) => b.flags(),
            Self::GetBulk(b) => b.flags(),
            Self::TestSet(b) => b.flags(),
            Self::Notify(b) => b.flags(),
            Self::Ping(b) => b.flags(),
            Self::IndexAllocate(b) => b.flags(),
            Self::IndexDeallocate(b) => b.flags(),
            Self::AddAgentCaps(b) => b.flags(),
            Self::RemoveAgentCaps(b) => b.flags(),
            Self::Open(_)
            | Self::Close(_)
            | Self::CommitSet
            | Self::UndoSet
            | Self::CleanupSet
            | Self::Response(_) => Flags::empty(),
        }
    }

    fn encode(&self, w: &mut Writer) {
        match self {
            Self::Open(b) => b.encode(w),
            Self::Close(b) => b.encode(w),
            Self::Register(b) => b.encode(w),
            Self::Unregister(b) => b.encode(w),
            Self::Get(b) | Self::GetNext(b) => b.encode(w),
            Self::GetBulk(b) => b.encode(w),
            Self::TestSet(b) => b.encode(w),
            Self::CommitSet | Self::UndoSet | Self::CleanupSet => {}
            Self::Notify(b) => b.encode(w),
            Self::Ping(b) => b.encode(w),
            Self::IndexAllocate(b) => b.encode(w),
            Self::IndexDeallocate(b) => b.encode(w),
            Self::AddAgentCaps(b) => b.encode(w),
            Self::RemoveAgentCaps(b) => b.encode(w),
            Self::Response(b) => b.encode(w),
        }
    }

    fn decode(pdu_type: PduType, r: &mut Reader<'_>, flags: Flags) -> Result<Self> {
        Ok(match pdu_type {
            PduType::Open => Self::Open(OpenPdu::decode(r)?),
            PduType::Close => Self::Close(ClosePdu::decode(r)?),
            PduType::Register => Self::Register(RegisterPdu::decode(r, flags)?),
            PduType::Unregister => Self::Unregister(UnregisterPdu::decode(r, flags)?),
            PduType::Get => Self::Get(GetPdu::decode(r, flags)?),
            PduType::GetNext => Self::GetNext(GetPdu::decode(r, flags)?),
            PduType::GetBulk => Self::GetBulk(GetBulkPdu::decode(r, flags)?),
            PduType::TestSet => Self::TestSet(TestSetPdu::decode(r, flags)?),
            PduType::CommitSet => Self::CommitSet,
            PduType::UndoSet => Self::UndoSet,
            PduType::CleanupSet => Self::CleanupSet,
            PduType::Notify => Self::Notify(NotifyPdu::decode(r, flags)?),
            PduType::Ping => Self::Ping(PingPdu::decode(r, flags)?),
            PduType::IndexAllocate => Self::IndexAllocate(IndexAllocatePdu::decode(r, flags)?),
            PduType::IndexDeallocate => {
                Self::IndexDeallocate(IndexDeallocatePdu::decode(r, flags)?)
            }
            PduType::AddAgentCaps => Self::AddAgentCaps(AddAgentCapsPdu::decode(r, flags)?),
            PduType::RemoveAgentCaps => {
                Self::RemoveAgentCaps(RemoveAgentCapsPdu::decode(r, flags)?)
            }
            PduType::Response => Self::Response(ResponsePdu::decode(r)?),
        })
    }
}

/// A complete AgentX PDU.
///
/// # Examples
///
/// ```
/// use async_agentx::pdu::{ByteOrder, OpenPdu, Pdu, PduPayload};
/// use async_agentx::oid;
///
/// let pdu = Pdu::new(
///     0,
///     0,
///     1,
///     ByteOrder::Big,
///     PduPayload::Open(OpenPdu::new(5, oid!(1, 3, 6, 1, 4, 1, 12345), &b"test"[..])),
/// );
///
/// let frame = pdu.encode();
/// assert_eq!(Pdu::decode(&frame).unwrap(), pdu);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub session_id: u32,
    pub transaction_id: u32,
    pub packet_id: u32,
    pub byte_order: ByteOrder,
    pub payload: PduPayload,
}

impl Pdu {
    pub fn new(
        session_id: u32,
        transaction_id: u32,
        packet_id: u32,
        byte_order: ByteOrder,
        payload: PduPayload,
    ) -> Self {
        Self {
            session_id,
            transaction_id,
            packet_id,
            byte_order,
            payload,
        }
    }

    /// Build a Response to this PDU, echoing its ids and byte order.
    pub fn response_to(&self, body: ResponsePdu) -> Pdu {
        Pdu {
            session_id: self.session_id,
            transaction_id: self.transaction_id,
            packet_id: self.packet_id,
            byte_order: self.byte_order,
            payload: PduPayload::Response(body),
        }
    }

    fn header_flags(&self) -> Flags {
        let mut flags = self.payload.flags();
        if self.byte_order == ByteOrder::Big {
            flags |= Flags::NETWORK_BYTE_ORDER;
        }
        flags
    }

    /// Encode the complete frame: header plus payload.
    pub fn encode(&self) -> Bytes {
        let mut w = Writer::new(self.byte_order);
        self.payload.encode(&mut w);
        let payload = w.freeze();

        let header = Header {
            version: PROTOCOL_VERSION,
            pdu_type: self.payload.pdu_type(),
            flags: self.header_flags(),
            session_id: self.session_id,
            transaction_id: self.transaction_id,
            packet_id: self.packet_id,
            payload_length: payload.len() as u32,
        };

        let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
        frame.put_slice(&header.encode());
        frame.put_slice(&payload);
        frame.freeze()
    }

    /// Decode a complete frame.
    ///
    /// Validates the header, that the declared payload length matches the
    /// bytes present, and that the body consumes the payload exactly.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < HEADER_LEN {
            return Err(Error::protocol(ProtocolErrorKind::Truncated {
                needed: HEADER_LEN,
                available: frame.len(),
            }));
        }
        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&frame[..HEADER_LEN]);
        let header = Header::decode(&raw)?;

        let payload = &frame[HEADER_LEN..];
        if header.payload_length as usize != payload.len() {
            return Err(Error::protocol(ProtocolErrorKind::PayloadLengthMismatch {
                declared: header.payload_length,
                actual: payload.len(),
            }));
        }

        Self::decode_parts(header, payload)
    }

    /// Decode a PDU whose header has already been read and whose payload
    /// was read to exactly `header.payload_length` bytes.
    pub(crate) fn decode_parts(header: Header, payload: &[u8]) -> Result<Self> {
        let order = header.byte_order();
        let mut r = Reader::new(payload, order);
        let body = PduPayload::decode(header.pdu_type, &mut r, header.flags)?;
        if !r.is_empty() {
            return Err(Error::protocol(ProtocolErrorKind::TrailingBytes {
                count: r.remaining(),
            }));
        }
        Ok(Self {
            session_id: header.session_id,
            transaction_id: header.transaction_id,
            packet_id: header.packet_id,
            byte_order: order,
            payload: body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use crate::value::Value;

    #[test]
    fn test_header_roundtrip_both_orders() {
        for order in [ByteOrder::Big, ByteOrder::Little] {
            let mut flags = Flags::empty();
            if order == ByteOrder::Big {
                flags |= Flags::NETWORK_BYTE_ORDER;
            }
            let header = Header {
                version: PROTOCOL_VERSION,
                pdu_type: PduType::Open,
                flags,
                session_id: 1,
                transaction_id: 2,
                packet_id: 3,
                payload_length: 100,
            };
            let buf = header.encode();
            assert_eq!(buf.len(), HEADER_LEN);
            assert_eq!(Header::decode(&buf).unwrap(), header);
        }
    }

    #[test]
    fn test_header_rejects_bad_version() {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = 2;
        buf[1] = 1;
        assert!(matches!(
            Header::decode(&buf),
            Err(Error::Protocol {
                kind: ProtocolErrorKind::UnsupportedVersion(2)
            })
        ));
    }

    #[test]
    fn test_header_rejects_unknown_type() {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = 1;
        buf[1] = 99;
        assert!(matches!(
            Header::decode(&buf),
            Err(Error::Protocol {
                kind: ProtocolErrorKind::UnknownPduType(99)
            })
        ));
    }

    #[test]
    fn test_header_rejects_nonzero_reserved() {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = 1;
        buf[1] = 1;
        buf[3] = 7;
        assert!(matches!(
            Header::decode(&buf),
            Err(Error::Protocol {
                kind: ProtocolErrorKind::ReservedNonZero
            })
        ));
    }

    #[test]
    fn test_pdu_type_conversion() {
        assert_eq!(PduType::try_from(1), Ok(PduType::Open));
        assert_eq!(PduType::try_from(18), Ok(PduType::Response));
        assert!(PduType::try_from(0).is_err());
        assert!(PduType::try_from(19).is_err());
    }

    #[test]
    fn test_search_range_roundtrip() {
        let range = SearchRange::new(oid!(1, 3, 6, 1, 2, 1), oid!(1, 3, 6, 1, 2, 2), true);
        let mut w = Writer::new(ByteOrder::Big);
        range.encode(&mut w);
        let buf = w.freeze();
        let mut r = Reader::new(&buf, ByteOrder::Big);
        assert_eq!(SearchRange::decode(&mut r).unwrap(), range);
    }

    #[test]
    fn test_search_range_unbounded() {
        let range = SearchRange::unbounded(oid!(1, 3, 6), false);
        assert!(range.is_unbounded());
        let mut w = Writer::new(ByteOrder::Big);
        range.encode(&mut w);
        let buf = w.freeze();
        let mut r = Reader::new(&buf, ByteOrder::Big);
        let decoded = SearchRange::decode(&mut r).unwrap();
        assert!(decoded.is_unbounded());
    }

    fn sample_pdus() -> Vec<PduPayload> {
        vec![
            PduPayload::Open(OpenPdu::new(5, oid!(1, 3, 6, 1, 4, 1, 12345), &b"test"[..])),
            PduPayload::Close(ClosePdu::new(CloseReason::Shutdown)),
            PduPayload::Register(RegisterPdu::new(oid!(1, 3, 6, 1, 4, 1, 12345), 127, 5)),
            PduPayload::Unregister(UnregisterPdu::new(oid!(1, 3, 6, 1, 4, 1, 12345), 127)),
            PduPayload::Get(GetPdu::new(vec![SearchRange::new(
                oid!(1, 3, 6, 1, 4, 1, 12345, 1, 0),
                Oid::empty(),
                false,
            )])),
            PduPayload::GetNext(GetPdu::new(vec![SearchRange::unbounded(
                oid!(1, 3, 6, 1, 4, 1, 12345),
                true,
            )])),
            PduPayload::GetBulk(GetBulkPdu::new(
                1,
                5,
                vec![SearchRange::unbounded(oid!(1, 3, 6, 1, 4, 1, 12345), false)],
            )),
            PduPayload::TestSet(TestSetPdu::new(vec![VarBind::new(
                oid!(1, 3, 6, 1, 4, 1, 12345, 1, 0),
                Value::Integer(7),
            )])),
            PduPayload::CommitSet,
            PduPayload::UndoSet,
            PduPayload::CleanupSet,
            PduPayload::Notify(NotifyPdu::new(vec![VarBind::new(
                oid!(1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0),
                Value::ObjectIdentifier(oid!(1, 3, 6, 1, 4, 1, 12345, 0, 1)),
            )])),
            PduPayload::Ping(PingPdu::new()),
            PduPayload::IndexAllocate(IndexAllocatePdu::new(vec![VarBind::new(
                oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 1),
                Value::Integer(0),
            )])),
            PduPayload::IndexDeallocate(IndexDeallocatePdu::new(vec![VarBind::new(
                oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 1),
                Value::Integer(3),
            )])),
            PduPayload::AddAgentCaps(AddAgentCapsPdu::new(
                oid!(1, 3, 6, 1, 4, 1, 12345, 99),
                &b"caps"[..],
            )),
            PduPayload::RemoveAgentCaps(RemoveAgentCapsPdu::new(oid!(1, 3, 6, 1, 4, 1, 12345, 99))),
            PduPayload::Response(ResponsePdu::success(
                1000,
                vec![VarBind::new(
                    oid!(1, 3, 6, 1, 4, 1, 12345, 1, 0),
                    Value::from("hello"),
                )],
            )),
        ]
    }

    #[test]
    fn test_encode_decode_every_type_both_orders() {
        for payload in sample_pdus() {
            for order in [ByteOrder::Big, ByteOrder::Little] {
                let pdu = Pdu::new(7, 8, 9, order, payload.clone());
                let frame = pdu.encode();
                let decoded = Pdu::decode(&frame)
                    .unwrap_or_else(|e| panic!("{}: {}", payload.pdu_type().name(), e));
                assert_eq!(decoded, pdu);
            }
        }
    }

    #[test]
    fn test_encoded_length_matches_header() {
        for payload in sample_pdus() {
            let pdu = Pdu::new(1, 2, 3, ByteOrder::Big, payload);
            let frame = pdu.encode();
            let mut raw = [0u8; HEADER_LEN];
            raw.copy_from_slice(&frame[..HEADER_LEN]);
            let header = Header::decode(&raw).unwrap();
            assert_eq!(frame.len(), HEADER_LEN + header.payload_length as usize);
        }
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let pdu = Pdu::new(1, 2, 3, ByteOrder::Big, PduPayload::Ping(PingPdu::new()));
        let mut frame = pdu.encode().to_vec();
        frame.push(0); // extra byte the header does not account for
        assert!(matches!(
            Pdu::decode(&frame),
            Err(Error::Protocol {
                kind: ProtocolErrorKind::PayloadLengthMismatch { .. }
            })
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes_in_body() {
        // A CommitSet has an empty body, so any payload is trailing garbage.
        let pdu = Pdu::new(1, 2, 3, ByteOrder::Big, PduPayload::CommitSet);
        let mut frame = pdu.encode().to_vec();
        frame.extend_from_slice(&[0, 0, 0, 0]);
        frame[19] = 4; // patch payload_length (big-endian low byte)
        assert!(matches!(
            Pdu::decode(&frame),
            Err(Error::Protocol {
                kind: ProtocolErrorKind::TrailingBytes { count: 4 }
            })
        ));
    }

    #[test]
    fn test_response_echoes_request_identity() {
        let request = Pdu::new(
            42,
            77,
            1234,
            ByteOrder::Little,
            PduPayload::Ping(PingPdu::new()),
        );
        let response = request.response_to(ResponsePdu::success(0, vec![]));
        assert_eq!(response.session_id, 42);
        assert_eq!(response.transaction_id, 77);
        assert_eq!(response.packet_id, 1234);
        assert_eq!(response.byte_order, ByteOrder::Little);
    }

    #[test]
    fn test_network_byte_order_flag_tracks_order() {
        let big = Pdu::new(0, 0, 1, ByteOrder::Big, PduPayload::Ping(PingPdu::new()));
        assert_eq!(big.encode()[2] & 0x10, 0x10);

        let little = Pdu::new(0, 0, 1, ByteOrder::Little, PduPayload::Ping(PingPdu::new()));
        assert_eq!(little.encode()[2] & 0x10, 0);
    }

    #[test]
    fn test_encode_varbinds_preserves_order() {
        let varbinds = vec![
            VarBind::new(oid!(1, 3, 6, 2), Value::Integer(1)),
            VarBind::new(oid!(1, 3, 6, 1), Value::Integer(2)),
        ];
        let combined = encode_varbinds(&varbinds, ByteOrder::Big);

        let mut w = Writer::new(ByteOrder::Big);
        varbinds[0].encode(&mut w);
        varbinds[1].encode(&mut w);
        assert_eq!(combined, w.freeze());
    }
}
