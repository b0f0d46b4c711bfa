//! SNMP value types carried in AgentX variable bindings.

use bytes::Bytes;

use crate::error::{ProtocolErrorKind, Error, Result};
use crate::oid::Oid;
use crate::pdu::wire::{Reader, Writer};

/// Maximum octet string size per RFC 2578 (SMIv2).
pub const MAX_OCTET_STRING_LEN: usize = 65535;

/// A typed SNMP value.
///
/// Covers the value set AgentX can carry in a variable binding
/// (RFC 2741 Section 5.4), including the three SNMPv2 exception markers.
///
/// # Examples
///
/// ```
/// use async_agentx::Value;
///
/// let v = Value::Integer(42);
/// assert_eq!(v.tag(), 2);
///
/// let s: Value = "hello".into();
/// assert!(matches!(s, Value::OctetString(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Value {
    /// INTEGER (signed 32-bit), tag 2.
    Integer(i32),

    /// OCTET STRING (arbitrary bytes, at most 65535 octets), tag 4.
    ///
    /// The limit is enforced by [`validate()`](Self::validate) before a
    /// value is encoded, not during decoding.
    OctetString(Bytes),

    /// NULL, tag 5.
    Null,

    /// OBJECT IDENTIFIER, tag 6.
    ObjectIdentifier(Oid),

    /// IpAddress (4 bytes, network order), tag 64.
    IpAddress([u8; 4]),

    /// Counter32 (unsigned 32-bit, wrapping), tag 65.
    Counter32(u32),

    /// Gauge32 / Unsigned32 (unsigned 32-bit, non-wrapping), tag 66.
    Gauge32(u32),

    /// TimeTicks (hundredths of a second), tag 67.
    TimeTicks(u32),

    /// Opaque (legacy, arbitrary bytes), tag 68.
    Opaque(Bytes),

    /// Counter64 (unsigned 64-bit, wrapping), tag 70.
    ///
    /// AgentX sessions carry SNMPv2 semantics, so Counter64 is always
    /// encodable; a master serving SNMPv1 requests will not forward it.
    Counter64(u64),

    /// noSuchObject exception, tag 128.
    NoSuchObject,

    /// noSuchInstance exception, tag 129.
    NoSuchInstance,

    /// endOfMibView exception, tag 130.
    EndOfMibView,
}

impl Value {
    /// The RFC 2741 Section 5.4 type tag for this value.
    pub fn tag(&self) -> u16 {
        match self {
            Self::Integer(_) => 2,
            Self::OctetString(_) => 4,
            Self::Null => 5,
            Self::ObjectIdentifier(_) => 6,
            Self::IpAddress(_) => 64,
            Self::Counter32(_) => 65,
            Self::Gauge32(_) => 66,
            Self::TimeTicks(_) => 67,
            Self::Opaque(_) => 68,
            Self::Counter64(_) => 70,
            Self::NoSuchObject => 128,
            Self::NoSuchInstance => 129,
            Self::EndOfMibView => 130,
        }
    }

    /// Whether this is one of the exception markers
    /// (noSuchObject, noSuchInstance, endOfMibView).
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }

    /// Check that the value can be encoded.
    ///
    /// Octet strings and opaques must not exceed [`MAX_OCTET_STRING_LEN`];
    /// embedded OIDs must not exceed 128 subidentifiers.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::OctetString(data) | Self::Opaque(data) => {
                if data.len() > MAX_OCTET_STRING_LEN {
                    return Err(Error::protocol(ProtocolErrorKind::OctetStringTooLong {
                        length: data.len(),
                        max: MAX_OCTET_STRING_LEN,
                    }));
                }
            }
            Self::ObjectIdentifier(oid) => {
                if oid.len() > crate::oid::MAX_OID_LEN {
                    return Err(Error::protocol(ProtocolErrorKind::OidTooLong {
                        count: oid.len(),
                        max: crate::oid::MAX_OID_LEN,
                    }));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Encode the value payload.
    ///
    /// The type tag is not part of the payload: in a variable binding it
    /// precedes the name OID, so the caller emits it separately.
    pub(crate) fn encode_payload(&self, w: &mut Writer) {
        match self {
            Self::Integer(v) => w.put_u32(*v as u32),
            Self::OctetString(data) | Self::Opaque(data) => w.put_octet_string(data),
            Self::Null | Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView => {}
            Self::ObjectIdentifier(oid) => w.put_oid(oid, false),
            Self::IpAddress(octets) => w.put_raw(octets),
            Self::Counter32(v) | Self::Gauge32(v) | Self::TimeTicks(v) => w.put_u32(*v),
            Self::Counter64(v) => w.put_u64(*v),
        }
    }

    /// Decode a value payload for an externally-read type tag.
    pub(crate) fn decode_payload(tag: u16, r: &mut Reader<'_>) -> Result<Self> {
        let value = match tag {
            2 => Self::Integer(r.read_u32()? as i32),
            4 => Self::OctetString(r.read_octet_string()?),
            5 => Self::Null,
            6 => Self::ObjectIdentifier(r.read_oid()?.0),
            64 => {
                let raw = r.read_bytes(4)?;
                Self::IpAddress([raw[0], raw[1], raw[2], raw[3]])
            }
            65 => Self::Counter32(r.read_u32()?),
            66 => Self::Gauge32(r.read_u32()?),
            67 => Self::TimeTicks(r.read_u32()?),
            68 => Self::Opaque(r.read_octet_string()?),
            70 => Self::Counter64(r.read_u64()?),
            128 => Self::NoSuchObject,
            129 => Self::NoSuchInstance,
            130 => Self::EndOfMibView,
            other => return Err(Error::protocol(ProtocolErrorKind::UnknownValueType(other))),
        };
        Ok(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "INTEGER: {}", v),
            Self::OctetString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "STRING: {}", s),
                Err(_) => {
                    write!(f, "HEX-STRING:")?;
                    for b in data.iter() {
                        write!(f, " {:02X}", b)?;
                    }
                    Ok(())
                }
            },
            Self::Null => write!(f, "NULL"),
            Self::ObjectIdentifier(oid) => write!(f, "OID: {}", oid),
            Self::IpAddress(o) => write!(f, "IpAddress: {}.{}.{}.{}", o[0], o[1], o[2], o[3]),
            Self::Counter32(v) => write!(f, "Counter32: {}", v),
            Self::Gauge32(v) => write!(f, "Gauge32: {}", v),
            Self::TimeTicks(v) => write!(f, "Timeticks: ({})", v),
            Self::Opaque(data) => write!(f, "Opaque: {} bytes", data.len()),
            Self::Counter64(v) => write!(f, "Counter64: {}", v),
            Self::NoSuchObject => write!(f, "No Such Object available on this agent at this OID"),
            Self::NoSuchInstance => write!(f, "No Such Instance currently exists at this OID"),
            Self::EndOfMibView => write!(f, "No more variables left in this MIB View"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::OctetString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::OctetString(Bytes::from(s.into_bytes()))
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::OctetString(Bytes::from(v))
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Self::OctetString(v)
    }
}

impl From<Oid> for Value {
    fn from(oid: Oid) -> Self {
        Self::ObjectIdentifier(oid)
    }
}

impl From<std::net::Ipv4Addr> for Value {
    fn from(addr: std::net::Ipv4Addr) -> Self {
        Self::IpAddress(addr.octets())
    }
}
