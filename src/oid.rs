//! Object Identifier (OID) type.
//!
//! OIDs are stored as `SmallVec<[u32; 16]>` to avoid heap allocation for
//! common OIDs.

use crate::error::{Error, OidErrorKind, Result};
use smallvec::SmallVec;
use std::fmt;

/// Maximum number of subidentifiers allowed in an OID.
///
/// Per RFC 2578 Section 3.5: "there are at most 128 sub-identifiers in a
/// value". RFC 2741 carries the same limit in its OID wire format.
pub const MAX_OID_LEN: usize = 128;

/// Object Identifier.
///
/// Stored as a sequence of subidentifier values (u32). Uses SmallVec to
/// avoid heap allocation for OIDs with 16 or fewer components.
///
/// The empty OID is permitted only as the wire-format "null OID" sentinel;
/// [`Oid::parse`] rejects the empty string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid {
    arcs: SmallVec<[u32; 16]>,
}

impl Oid {
    /// Create an empty OID (the "null OID" sentinel).
    pub fn empty() -> Self {
        Self {
            arcs: SmallVec::new(),
        }
    }

    /// Create an OID from subidentifier values.
    ///
    /// Accepts any iterator of `u32` values.
    ///
    /// # Examples
    ///
    /// ```
    /// use async_agentx::oid::Oid;
    ///
    /// let oid = Oid::new(vec![1, 3, 6, 1, 4, 1]);
    /// assert_eq!(oid.arcs(), &[1, 3, 6, 1, 4, 1]);
    /// ```
    pub fn new(arcs: impl IntoIterator<Item = u32>) -> Self {
        Self {
            arcs: arcs.into_iter().collect(),
        }
    }

    /// Create an OID from a slice of subidentifiers.
    pub fn from_slice(arcs: &[u32]) -> Self {
        Self {
            arcs: SmallVec::from_slice(arcs),
        }
    }

    /// Parse an OID from dotted decimal notation (e.g. "1.3.6.1.4.1.12345").
    ///
    /// A single leading dot and surrounding whitespace are accepted.
    /// Rejected inputs:
    ///
    /// - the empty string (use [`Oid::empty`] for the null OID)
    /// - empty components (`"1..3"`)
    /// - non-decimal components (`"1.x.3"`)
    /// - leading zeros beyond a single `0` (`"1.03"`)
    /// - components above 2^32 - 1
    /// - more than [`MAX_OID_LEN`] components
    ///
    /// # Examples
    ///
    /// ```
    /// use async_agentx::oid::Oid;
    ///
    /// let oid = Oid::parse("1.3.6.1.4.1.12345").unwrap();
    /// assert_eq!(oid.len(), 7);
    /// assert_eq!(oid.to_string(), "1.3.6.1.4.1.12345");
    ///
    /// assert!(Oid::parse("").is_err());
    /// assert!(Oid::parse("1..3").is_err());
    /// assert!(Oid::parse("1.03").is_err());
    /// assert!(Oid::parse("1.4294967296").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('.').unwrap_or(trimmed);

        if trimmed.is_empty() {
            return Err(Error::invalid_oid_with_input(OidErrorKind::Empty, s));
        }

        let mut arcs = SmallVec::new();

        for part in trimmed.split('.') {
            if part.is_empty() {
                return Err(Error::invalid_oid_with_input(
                    OidErrorKind::EmptyComponent,
                    s,
                ));
            }
            if part.len() > 1 && part.starts_with('0') {
                return Err(Error::invalid_oid_with_input(OidErrorKind::LeadingZero, s));
            }
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::invalid_oid_with_input(
                    OidErrorKind::InvalidComponent,
                    s,
                ));
            }

            let arc: u32 = part
                .parse()
                .map_err(|_| Error::invalid_oid_with_input(OidErrorKind::ComponentOverflow, s))?;

            arcs.push(arc);
        }

        if arcs.len() > MAX_OID_LEN {
            return Err(Error::invalid_oid_with_input(
                OidErrorKind::TooManyComponents {
                    count: arcs.len(),
                    max: MAX_OID_LEN,
                },
                s,
            ));
        }

        Ok(Self { arcs })
    }

    /// Get the subidentifier values.
    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    /// Get the number of subidentifiers.
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    /// Check if the OID is empty (the null OID sentinel).
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Check if this OID is a prefix of another.
    ///
    /// Every OID is a prefix of itself, and the empty OID is a prefix of
    /// any OID.
    ///
    /// # Examples
    ///
    /// ```
    /// use async_agentx::oid::Oid;
    ///
    /// let subtree = Oid::parse("1.3.6.1.4.1.12345").unwrap();
    /// let instance = Oid::parse("1.3.6.1.4.1.12345.1.0").unwrap();
    ///
    /// assert!(subtree.is_prefix_of(&instance));
    /// assert!(!instance.is_prefix_of(&subtree));
    /// assert!(subtree.is_prefix_of(&subtree));
    /// ```
    pub fn is_prefix_of(&self, other: &Oid) -> bool {
        other.arcs.len() >= self.arcs.len() && other.arcs[..self.arcs.len()] == self.arcs[..]
    }

    /// Check if this OID starts with another OID.
    ///
    /// The converse of [`is_prefix_of`](Self::is_prefix_of).
    pub fn starts_with(&self, other: &Oid) -> bool {
        other.is_prefix_of(self)
    }

    /// Get the parent OID (all subidentifiers except the last).
    ///
    /// Returns `None` if the OID is empty.
    pub fn parent(&self) -> Option<Oid> {
        if self.arcs.is_empty() {
            None
        } else {
            Some(Oid {
                arcs: SmallVec::from_slice(&self.arcs[..self.arcs.len() - 1]),
            })
        }
    }

    /// Create a child OID by appending a subidentifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use async_agentx::oid::Oid;
    ///
    /// let subtree = Oid::parse("1.3.6.1.4.1.12345").unwrap();
    /// assert_eq!(subtree.child(1).to_string(), "1.3.6.1.4.1.12345.1");
    /// ```
    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.arcs.clone();
        arcs.push(arc);
        Oid { arcs }
    }

    /// Concatenate a suffix OID onto this one.
    pub fn join(&self, suffix: &Oid) -> Oid {
        let mut arcs = self.arcs.clone();
        arcs.extend_from_slice(&suffix.arcs);
        Oid { arcs }
    }

    /// The wire-format internet prefix byte, when applicable.
    ///
    /// RFC 2741 Section 5.1 compresses OIDs beginning `1.3.6.1.x` (x <= 255)
    /// by carrying x in the header's prefix byte. Returns `Some(x)` when
    /// this OID qualifies.
    pub(crate) fn internet_prefix(&self) -> Option<u8> {
        if self.arcs.len() >= 5 && self.arcs[..4] == [1, 3, 6, 1] && self.arcs[4] <= u8::MAX as u32
        {
            Some(self.arcs[4] as u8)
        } else {
            None
        }
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arc in &self.arcs {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{}", arc)?;
            first = false;
        }
        Ok(())
    }
}

impl std::str::FromStr for Oid {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<&[u32]> for Oid {
    fn from(arcs: &[u32]) -> Self {
        Self::from_slice(arcs)
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(arcs: [u32; N]) -> Self {
        Self::new(arcs)
    }
}

/// Macro to create an OID literal.
///
/// This is the preferred way to create OID constants since it avoids
/// parsing overhead.
///
/// # Examples
///
/// ```
/// use async_agentx::oid;
///
/// let subtree = oid!(1, 3, 6, 1, 4, 1, 12345);
/// assert_eq!(subtree.to_string(), "1.3.6.1.4.1.12345");
/// ```
#[macro_export]
macro_rules! oid {
    ($($arc:expr),* $(,)?) => {
        $crate::oid::Oid::from_slice(&[$($arc),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let oid = Oid::parse("1.3.6.1.4.1.12345").unwrap();
        assert_eq!(oid.arcs(), &[1, 3, 6, 1, 4, 1, 12345]);
    }

    #[test]
    fn test_parse_render_roundtrip() {
        let input = "1.3.6.1.4.1.12345";
        let oid = Oid::parse(input).unwrap();
        assert_eq!(oid.to_string(), input);
    }

    #[test]
    fn test_parse_leading_dot_and_whitespace() {
        assert_eq!(Oid::parse(".1.3.6.1").unwrap().arcs(), &[1, 3, 6, 1]);
        assert_eq!(Oid::parse("  1.3.6.1  ").unwrap().arcs(), &[1, 3, 6, 1]);
    }

    #[test]
    fn test_parse_single_component() {
        let oid = Oid::parse("1").unwrap();
        assert_eq!(oid.arcs(), &[1]);
    }

    #[test]
    fn test_parse_zero_component() {
        let oid = Oid::parse("1.3.0.1").unwrap();
        assert_eq!(oid.arcs(), &[1, 3, 0, 1]);
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(
            Oid::parse(""),
            Err(Error::InvalidOid {
                kind: OidErrorKind::Empty,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_rejects_empty_component() {
        assert!(matches!(
            Oid::parse("1..3"),
            Err(Error::InvalidOid {
                kind: OidErrorKind::EmptyComponent,
                ..
            })
        ));
        assert!(Oid::parse("1.3.").is_err());
    }

    #[test]
    fn test_parse_rejects_leading_zero() {
        assert!(matches!(
            Oid::parse("1.03.6"),
            Err(Error::InvalidOid {
                kind: OidErrorKind::LeadingZero,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_rejects_non_decimal() {
        assert!(Oid::parse("1.3.abc.1").is_err());
        assert!(Oid::parse("1.3.-6.1").is_err());
    }

    #[test]
    fn test_parse_rejects_overflow() {
        // u32::MAX is fine, one above is not
        assert!(Oid::parse("1.4294967295").is_ok());
        assert!(matches!(
            Oid::parse("1.4294967296"),
            Err(Error::InvalidOid {
                kind: OidErrorKind::ComponentOverflow,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_rejects_too_long() {
        let ok: String = (0..MAX_OID_LEN).map(|_| "1").collect::<Vec<_>>().join(".");
        assert!(Oid::parse(&ok).is_ok());

        let long: String = (0..=MAX_OID_LEN)
            .map(|_| "1")
            .collect::<Vec<_>>()
            .join(".");
        assert!(matches!(
            Oid::parse(&long),
            Err(Error::InvalidOid {
                kind: OidErrorKind::TooManyComponents { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_is_prefix_of() {
        let subtree = Oid::parse("1.3.6.1.4").unwrap();
        let instance = Oid::parse("1.3.6.1.4.1.0").unwrap();
        assert!(subtree.is_prefix_of(&instance));
        assert!(!instance.is_prefix_of(&subtree));
        assert!(Oid::empty().is_prefix_of(&subtree));
        assert!(instance.starts_with(&subtree));
    }

    #[test]
    fn test_parent_child() {
        let oid = Oid::parse("1.3.6").unwrap();
        assert_eq!(oid.child(1).to_string(), "1.3.6.1");
        assert_eq!(oid.parent().unwrap().to_string(), "1.3");
        assert!(Oid::empty().parent().is_none());
    }

    #[test]
    fn test_join() {
        let root = oid!(1, 3, 6, 1, 4, 1, 12345);
        let suffix = oid!(1, 0);
        assert_eq!(root.join(&suffix).to_string(), "1.3.6.1.4.1.12345.1.0");
    }

    #[test]
    fn test_ordering() {
        // Numeric component order, not string order: 1.2 < 1.10
        assert!(oid!(1, 2) < oid!(1, 10));
        // A strict prefix sorts before its extensions
        assert!(oid!(1, 3, 6) < oid!(1, 3, 6, 1));
        assert!(oid!(1, 3, 6, 2) > oid!(1, 3, 6, 1, 9));
    }

    #[test]
    fn test_sorting() {
        let mut oids = vec![
            oid!(1, 3, 6, 1, 10),
            oid!(1, 3, 6, 1, 2),
            oid!(1, 3, 6, 1, 1),
            oid!(1, 3, 6, 2),
        ];
        oids.sort();
        let rendered: Vec<String> = oids.iter().map(|o| o.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["1.3.6.1.1", "1.3.6.1.2", "1.3.6.1.10", "1.3.6.2"]
        );
    }

    #[test]
    fn test_internet_prefix() {
        assert_eq!(oid!(1, 3, 6, 1, 4, 1, 12345).internet_prefix(), Some(4));
        assert_eq!(oid!(1, 3, 6, 1, 255).internet_prefix(), Some(255));
        // Fifth component above 255 does not compress
        assert_eq!(oid!(1, 3, 6, 1, 256).internet_prefix(), None);
        // Too short or wrong stem
        assert_eq!(oid!(1, 3, 6, 1).internet_prefix(), None);
        assert_eq!(oid!(1, 3, 6, 2, 4).internet_prefix(), None);
    }

    #[test]
    fn test_macro() {
        let oid = oid!(1, 3, 6, 1);
        assert_eq!(oid.arcs(), &[1, 3, 6, 1]);
    }
}
