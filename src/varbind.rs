//! Variable bindings: (OID, value) pairs.

use crate::error::Result;
use crate::oid::Oid;
use crate::pdu::wire::{Reader, Writer};
use crate::value::Value;

/// A variable binding.
///
/// Encodes on the wire as the value's type tag (u16), a reserved u16, the
/// name OID, then the value payload.
///
/// # Examples
///
/// ```
/// use async_agentx::{VarBind, Value, oid};
///
/// let vb = VarBind::new(oid!(1, 3, 6, 1, 4, 1, 12345, 1, 0), Value::Integer(42));
/// assert_eq!(vb.to_string(), "1.3.6.1.4.1.12345.1.0 = INTEGER: 42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: Value,
}

impl VarBind {
    pub fn new(oid: Oid, value: Value) -> Self {
        Self { oid, value }
    }

    /// A noSuchObject exception binding for the given name.
    pub fn no_such_object(oid: Oid) -> Self {
        Self::new(oid, Value::NoSuchObject)
    }

    /// A noSuchInstance exception binding for the given name.
    pub fn no_such_instance(oid: Oid) -> Self {
        Self::new(oid, Value::NoSuchInstance)
    }

    /// An endOfMibView exception binding for the given name.
    pub fn end_of_mib_view(oid: Oid) -> Self {
        Self::new(oid, Value::EndOfMibView)
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        // Type tag first, then the name, then the payload (RFC 2741 5.4)
        w.put_u16(self.value.tag());
        w.put_u16(0); // reserved
        w.put_oid(&self.oid, false);
        self.value.encode_payload(w);
    }

    pub(crate) fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let tag = r.read_u16()?;
        let _reserved = r.read_u16()?;
        let (oid, _include) = r.read_oid()?;
        let value = Value::decode_payload(tag, r)?;
        Ok(Self { oid, value })
    }
}

impl std::fmt::Display for VarBind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.oid, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use crate::pdu::wire::ByteOrder;
    use bytes::Bytes;

    fn roundtrip(vb: &VarBind, order: ByteOrder) -> VarBind {
        let mut w = Writer::new(order);
        vb.encode(&mut w);
        let buf = w.freeze();
        let mut r = Reader::new(&buf, order);
        let decoded = VarBind::decode(&mut r).unwrap();
        assert!(r.is_empty());
        decoded
    }

    #[test]
    fn test_roundtrip() {
        let vb = VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::Integer(42));
        for order in [ByteOrder::Big, ByteOrder::Little] {
            assert_eq!(roundtrip(&vb, order), vb);
        }
    }

    #[test]
    fn test_roundtrip_octet_string() {
        let vb = VarBind::new(
            oid!(1, 3, 6, 1, 2, 1, 1, 5, 0),
            Value::OctetString(Bytes::from_static(b"hostname")),
        );
        assert_eq!(roundtrip(&vb, ByteOrder::Big), vb);
    }

    #[test]
    fn test_wire_layout_tag_first() {
        // Type tag precedes the name OID
        let vb = VarBind::new(oid!(1, 3, 6, 2), Value::Counter64(7));
        let mut w = Writer::new(ByteOrder::Big);
        vb.encode(&mut w);
        let buf = w.freeze();
        assert_eq!(&buf[..2], &[0, 70]); // Counter64 tag
        assert_eq!(&buf[2..4], &[0, 0]); // reserved
        assert_eq!(buf[4], 4); // n_subid of the name
    }

    #[test]
    fn test_exception_constructors() {
        assert_eq!(
            VarBind::end_of_mib_view(oid!(1, 3)).value,
            Value::EndOfMibView
        );
        assert_eq!(
            VarBind::no_such_object(oid!(1, 3)).value,
            Value::NoSuchObject
        );
        assert_eq!(
            VarBind::no_such_instance(oid!(1, 3)).value,
            Value::NoSuchInstance
        );
    }
}
