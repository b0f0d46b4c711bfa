//! Byte-order-aware primitives for the AgentX wire format.
//!
//! Every multi-byte integer in an AgentX PDU uses the byte order announced
//! by that PDU's own NETWORK_BYTE_ORDER flag, so the order is carried as a
//! parameter through every encode and decode rather than being a global
//! setting.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolErrorKind, Error, Result};
use crate::oid::{MAX_OID_LEN, Oid};

/// Byte order of a single PDU's multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Network byte order (NETWORK_BYTE_ORDER flag set).
    Big,
    /// Little-endian byte order (flag clear).
    Little,
}

impl ByteOrder {
    /// The host's native byte order. Subagents prefer this for PDUs they
    /// originate.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }
}

fn pad_to_4(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

/// Cursor over a PDU payload.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8], order: ByteOrder) -> Self {
        Self { buf, pos: 0, order }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::protocol(ProtocolErrorKind::Truncated {
                needed: n,
                available: self.remaining(),
            }));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(match self.order {
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(match self.order {
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(match self.order {
            ByteOrder::Big => u64::from_be_bytes(raw),
            ByteOrder::Little => u64::from_le_bytes(raw),
        })
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Decode a wire OID, returning the OID and its include flag.
    ///
    /// Wire layout (RFC 2741 Section 5.1): n_subid, prefix, include,
    /// reserved, then n_subid u32 subidentifiers. A nonzero prefix byte
    /// expands to `1.3.6.1.prefix` prepended to the subidentifiers.
    pub fn read_oid(&mut self) -> Result<(Oid, bool)> {
        let header = self.take(4)?;
        let n_subid = header[0] as usize;
        let prefix = header[1];
        let include = header[2] != 0;
        if header[3] != 0 {
            return Err(Error::protocol(ProtocolErrorKind::ReservedNonZero));
        }

        let total = n_subid + if prefix != 0 { 5 } else { 0 };
        if total > MAX_OID_LEN {
            return Err(Error::protocol(ProtocolErrorKind::OidTooLong {
                count: total,
                max: MAX_OID_LEN,
            }));
        }

        let mut arcs = Vec::with_capacity(total);
        if prefix != 0 {
            arcs.extend_from_slice(&[1, 3, 6, 1, prefix as u32]);
        }
        for _ in 0..n_subid {
            arcs.push(self.read_u32()?);
        }

        Ok((Oid::new(arcs), include))
    }

    /// Decode an octet string: u32 length, bytes, zero padding to a 4-byte
    /// boundary. Padding content is not inspected.
    pub fn read_octet_string(&mut self) -> Result<Bytes> {
        let len = self.read_u32()? as usize;
        if len > crate::value::MAX_OCTET_STRING_LEN {
            return Err(Error::protocol(ProtocolErrorKind::OctetStringTooLong {
                length: len,
                max: crate::value::MAX_OCTET_STRING_LEN,
            }));
        }
        if len > self.remaining() {
            return Err(Error::protocol(ProtocolErrorKind::OctetStringTooLong {
                length: len,
                max: self.remaining(),
            }));
        }
        let data = Bytes::copy_from_slice(self.take(len)?);
        self.take(pad_to_4(len))?;
        Ok(data)
    }
}

/// Growable encode buffer for a PDU payload.
pub struct Writer {
    buf: BytesMut,
    order: ByteOrder,
}

impl Writer {
    pub fn new(order: ByteOrder) -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        match self.order {
            ByteOrder::Big => self.buf.put_u16(v),
            ByteOrder::Little => self.buf.put_u16_le(v),
        }
    }

    pub fn put_u32(&mut self, v: u32) {
        match self.order {
            ByteOrder::Big => self.buf.put_u32(v),
            ByteOrder::Little => self.buf.put_u32_le(v),
        }
    }

    pub fn put_u64(&mut self, v: u64) {
        match self.order {
            ByteOrder::Big => self.buf.put_u64(v),
            ByteOrder::Little => self.buf.put_u64_le(v),
        }
    }

    pub fn put_raw(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Encode a wire OID, applying internet prefix compression when the OID
    /// begins `1.3.6.1.x` with x <= 255.
    pub fn put_oid(&mut self, oid: &Oid, include: bool) {
        let arcs = oid.arcs();
        let (prefix, skip) = match oid.internet_prefix() {
            Some(p) => (p, 5),
            None => (0, 0),
        };
        self.buf.put_u8((arcs.len() - skip) as u8);
        self.buf.put_u8(prefix);
        self.buf.put_u8(include as u8);
        self.buf.put_u8(0); // reserved
        for &arc in &arcs[skip..] {
            self.put_u32(arc);
        }
    }

    /// Encode an octet string with zero padding to a 4-byte boundary.
    pub fn put_octet_string(&mut self, data: &[u8]) {
        self.put_u32(data.len() as u32);
        self.buf.put_slice(data);
        for _ in 0..pad_to_4(data.len()) {
            self.buf.put_u8(0);
        }
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}
