//! Generic netlink message sub-header.

use crate::netlink::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Size of the generic netlink header.
pub const GENL_HDRLEN: usize = std::mem::size_of::<GenlMsgHdr>();

/// Generic netlink message header (mirrors struct genlmsghdr).
///
/// Sits at the start of every genl message payload, before the attributes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GenlMsgHdr {
    /// Command.
    pub cmd: u8,
    /// Family protocol version.
    pub version: u8,
    /// Reserved, must be zero.
    pub reserved: u16,
}

impl GenlMsgHdr {
    /// Create a new generic netlink header.
    pub fn new(cmd: u8, version: u8) -> Self {
        Self {
            cmd,
            version,
            reserved: 0,
        }
    }

    /// Parse a header from the start of a message payload, returning it and
    /// the attribute bytes that follow.
    pub fn from_bytes(data: &[u8]) -> Result<(&Self, &[u8])> {
        Self::ref_from_prefix(data).map_err(|_| Error::Truncated {
            expected: GENL_HDRLEN,
            actual: data.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(GENL_HDRLEN, 4);
    }

    #[test]
    fn test_roundtrip() {
        let hdr = GenlMsgHdr::new(3, 2);
        let mut bytes = hdr.as_bytes().to_vec();
        bytes.extend_from_slice(&[1, 2, 3, 4]);

        let (parsed, rest) = GenlMsgHdr::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.cmd, 3);
        assert_eq!(parsed.version, 2);
        assert_eq!(parsed.reserved, 0);
        assert_eq!(rest, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            GenlMsgHdr::from_bytes(&[1, 2]),
            Err(Error::Truncated { expected: 4, .. })
        ));
    }
}
