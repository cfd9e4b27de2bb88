//! Netlink attribute (nlattr) handling.
//!
//! Attributes are Type-Length-Value records aligned to 4 bytes. A type with
//! the [`NLA_F_NESTED`] bit set carries a further attribute sequence as its
//! value; [`NestedWalk`] traverses such trees with an explicit worklist so
//! that wire-driven nesting depth can never exhaust the call stack.

use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4; // nla_align(size_of::<NlAttr>())

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// Netlink attribute header (mirrors struct nlattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header, before padding.
    pub nla_len: u16,
    /// Attribute type, high bits carry the nested/byte-order flags.
    pub nla_type: u16,
}

impl NlAttr {
    /// Create a new attribute header for a payload of `data_len` bytes.
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Check if this is a nested attribute.
    pub fn is_nested(&self) -> bool {
        self.nla_type & NLA_F_NESTED != 0
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nla_len as usize).saturating_sub(NLA_HDRLEN)
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from the start of a buffer.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Iterator over a flat sequence of netlink attributes.
///
/// Yields `(header, payload)` pairs. A trailing partial header or a declared
/// length outside `4..=remaining` is reported as
/// [`Error::TruncatedAttribute`]; iteration stops after an error. The final
/// attribute may legally omit its trailing padding.
pub struct AttrIter<'a> {
    data: &'a [u8],
    failed: bool,
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            failed: false,
        }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Result<(NlAttr, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }

        if self.data.len() < NLA_HDRLEN {
            self.failed = true;
            return Some(Err(Error::TruncatedAttribute {
                declared: NLA_HDRLEN,
                remaining: self.data.len(),
            }));
        }

        let attr = match NlAttr::from_bytes(self.data) {
            Ok(a) => *a,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };

        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN || len > self.data.len() {
            self.failed = true;
            return Some(Err(Error::TruncatedAttribute {
                declared: len,
                remaining: self.data.len(),
            }));
        }

        let payload = &self.data[NLA_HDRLEN..len];

        // Advance past the value and its padding; the last attribute may
        // end exactly at the buffer boundary without padding.
        let aligned_len = nla_align(len);
        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Ok((attr, payload)))
    }
}

/// Depth-first traversal of an attribute tree.
///
/// Container attributes (those with [`NLA_F_NESTED`] set) are yielded first,
/// then their children, using an explicit stack of iterators. Stack depth is
/// bounded by the payload size (each level consumes at least one attribute
/// header), so adversarial nesting cannot overflow the thread stack.
pub struct NestedWalk<'a> {
    stack: Vec<AttrIter<'a>>,
}

impl<'a> NestedWalk<'a> {
    /// Start a walk over a top-level attribute sequence.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            stack: vec![AttrIter::new(data)],
        }
    }
}

impl<'a> Iterator for NestedWalk<'a> {
    type Item = Result<(NlAttr, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let iter = self.stack.last_mut()?;
            match iter.next() {
                None => {
                    self.stack.pop();
                }
                Some(Err(e)) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
                Some(Ok((attr, payload))) => {
                    if attr.is_nested() {
                        self.stack.push(AttrIter::new(payload));
                    }
                    return Some(Ok((attr, payload)));
                }
            }
        }
    }
}

/// Helper functions for extracting typed values from attribute payloads.
pub mod get {
    use super::*;

    /// Extract a u8 value.
    pub fn u8(data: &[u8]) -> Result<u8> {
        if data.is_empty() {
            return Err(Error::InvalidAttribute("empty u8 attribute".into()));
        }
        Ok(data[0])
    }

    /// Extract a u16 value (native endian).
    pub fn u16_ne(data: &[u8]) -> Result<u16> {
        if data.len() < 2 {
            return Err(Error::InvalidAttribute("truncated u16 attribute".into()));
        }
        Ok(u16::from_ne_bytes([data[0], data[1]]))
    }

    /// Extract a u32 value (native endian).
    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        if data.len() < 4 {
            return Err(Error::InvalidAttribute("truncated u32 attribute".into()));
        }
        Ok(u32::from_ne_bytes([data[0], data[1], data[2], data[3]]))
    }

    /// Extract a u64 value (native endian).
    pub fn u64_ne(data: &[u8]) -> Result<u64> {
        if data.len() < 8 {
            return Err(Error::InvalidAttribute("truncated u64 attribute".into()));
        }
        Ok(u64::from_ne_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ]))
    }

    /// Extract a C-style string, stripping the trailing NUL terminator.
    pub fn string(data: &[u8]) -> Result<&str> {
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map_err(|e| Error::InvalidAttribute(format!("invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::builder::MessageBuilder;
    use crate::netlink::message::{NLM_F_REQUEST, NLMSG_HDRLEN};

    fn attr_payload(builder: MessageBuilder) -> Vec<u8> {
        builder.finish()[NLMSG_HDRLEN..].to_vec()
    }

    #[test]
    fn test_roundtrip_leaf() {
        // Values of every length mod 4, so every padding case is exercised.
        for len in 0..=9usize {
            let value: Vec<u8> = (0..len as u8).collect();
            let mut builder = MessageBuilder::new(0, NLM_F_REQUEST);
            builder.append_attr(7, &value);
            let buf = attr_payload(builder);

            let decoded: Vec<_> = AttrIter::new(&buf).collect::<Result<_>>().unwrap();
            assert_eq!(decoded.len(), 1);
            let (attr, payload) = decoded[0];
            assert_eq!(attr.kind(), 7);
            assert!(!attr.is_nested());
            assert_eq!(payload, &value[..]);
        }
    }

    #[test]
    fn test_roundtrip_multiple() {
        let mut builder = MessageBuilder::new(0, NLM_F_REQUEST);
        builder.append_attr_u16(1, 0xbeef);
        builder.append_attr(2, b"abc");
        builder.append_attr_u32(3, 0xdeadbeef);
        let buf = attr_payload(builder);

        let decoded: Vec<_> = AttrIter::new(&buf).collect::<Result<_>>().unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].0.kind(), 1);
        assert_eq!(get::u16_ne(decoded[0].1).unwrap(), 0xbeef);
        assert_eq!(decoded[1].1, b"abc");
        assert_eq!(get::u32_ne(decoded[2].1).unwrap(), 0xdeadbeef);
    }

    #[test]
    fn test_roundtrip_nested() {
        let mut builder = MessageBuilder::new(0, NLM_F_REQUEST);
        let outer = builder.nest_start(10);
        builder.append_attr_u8(1, 0x55);
        let inner = builder.nest_start(11);
        builder.append_attr(2, b"x");
        builder.nest_end(inner);
        builder.nest_end(outer);
        let buf = attr_payload(builder);

        let walked: Vec<_> = NestedWalk::new(&buf).collect::<Result<_>>().unwrap();
        let kinds: Vec<(u16, bool)> = walked.iter().map(|(a, _)| (a.kind(), a.is_nested())).collect();
        assert_eq!(kinds, vec![(10, true), (1, false), (11, true), (2, false)]);
        assert_eq!(walked[3].1, b"x");
    }

    #[test]
    fn test_truncated_declared_length() {
        // Declared length 12, only 8 bytes present.
        let buf = [12u8, 0, 1, 0, 0xaa, 0xbb, 0xcc, 0xdd];
        let mut iter = AttrIter::new(&buf);
        match iter.next() {
            Some(Err(Error::TruncatedAttribute {
                declared: 12,
                remaining: 8,
            })) => {}
            other => panic!("expected TruncatedAttribute, got {:?}", other.map(|r| r.map(|_| ()))),
        }
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_truncated_header() {
        let buf = [4u8, 0, 1];
        let mut iter = AttrIter::new(&buf);
        assert!(matches!(
            iter.next(),
            Some(Err(Error::TruncatedAttribute { remaining: 3, .. }))
        ));
    }

    #[test]
    fn test_declared_length_below_header() {
        let buf = [2u8, 0, 1, 0];
        let mut iter = AttrIter::new(&buf);
        assert!(matches!(
            iter.next(),
            Some(Err(Error::TruncatedAttribute { declared: 2, .. }))
        ));
    }

    #[test]
    fn test_last_attr_without_padding() {
        // 5-byte value, no trailing padding after it.
        let mut buf = vec![9u8, 0, 3, 0];
        buf.extend_from_slice(b"hello");
        let decoded: Vec<_> = AttrIter::new(&buf).collect::<Result<_>>().unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].1, b"hello");
    }

    #[test]
    fn test_deep_nesting_uses_heap() {
        // 200 levels of single-child nesting; a recursive decoder would be
        // at risk here, the worklist walk is not.
        let depth = 200;
        let mut builder = MessageBuilder::new(0, NLM_F_REQUEST);
        let mut tokens = Vec::new();
        for _ in 0..depth {
            tokens.push(builder.nest_start(1));
        }
        builder.append_attr_u8(2, 42);
        for token in tokens.into_iter().rev() {
            builder.nest_end(token);
        }
        let buf = attr_payload(builder);

        let walked: Vec<_> = NestedWalk::new(&buf).collect::<Result<_>>().unwrap();
        assert_eq!(walked.len(), depth + 1);
        assert_eq!(walked[depth].0.kind(), 2);
        assert_eq!(get::u8(walked[depth].1).unwrap(), 42);
    }

    #[test]
    fn test_get_string_strips_nul() {
        assert_eq!(get::string(b"pci\0").unwrap(), "pci");
        assert_eq!(get::string(b"pci").unwrap(), "pci");
        assert_eq!(get::string(b"\0").unwrap(), "");
    }
}
