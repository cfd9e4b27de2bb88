//! Netlink message header, flags and acknowledgement decoding.

use super::attr::AttrIter;
use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink message header alignment.
pub const NLMSG_ALIGNTO: usize = 4;

/// Align a length to NLMSG_ALIGNTO boundary.
#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// Size of the netlink message header.
pub const NLMSG_HDRLEN: usize = nlmsg_align(std::mem::size_of::<NlMsgHdr>());

/// Netlink message header (mirrors struct nlmsghdr), native byte order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    /// Length of message including header.
    pub nlmsg_len: u32,
    /// Message type (a resolved genl family id for data messages).
    pub nlmsg_type: u16,
    /// Additional flags.
    pub nlmsg_flags: u16,
    /// Sequence number.
    pub nlmsg_seq: u32,
    /// Destination port id on kernel-to-user messages.
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    /// Create a new message header. The length is a placeholder until
    /// serialization recomputes it.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            nlmsg_len: NLMSG_HDRLEN as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            nlmsg_seq: 0,
            nlmsg_pid: 0,
        }
    }

    /// Check if this is an error/ACK message.
    pub fn is_error(&self) -> bool {
        self.nlmsg_type == NlMsgType::ERROR
    }

    /// Check if this is an end-of-dump message.
    pub fn is_done(&self) -> bool {
        self.nlmsg_type == NlMsgType::DONE
    }

    /// Check if this message has the multi-part flag.
    pub fn is_multi(&self) -> bool {
        self.nlmsg_flags & NLM_F_MULTI != 0
    }

    /// Convert header to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse header from the start of a buffer.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Standard netlink message types.
pub struct NlMsgType;

impl NlMsgType {
    /// No operation, message must be discarded.
    pub const NOOP: u16 = 1;
    /// Error message or ACK.
    pub const ERROR: u16 = 2;
    /// End of multipart message.
    pub const DONE: u16 = 3;
    /// Data lost, request resend.
    pub const OVERRUN: u16 = 4;
    /// First type available to protocol families.
    pub const MIN_TYPE: u16 = 0x10;
}

/// Netlink message flags.
pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_MULTI: u16 = 0x02;
pub const NLM_F_ACK: u16 = 0x04;
pub const NLM_F_ECHO: u16 = 0x08;
pub const NLM_F_DUMP_INTR: u16 = 0x10;
pub const NLM_F_DUMP_FILTERED: u16 = 0x20;

// Modifiers to GET requests
pub const NLM_F_ROOT: u16 = 0x100;
pub const NLM_F_MATCH: u16 = 0x200;
pub const NLM_F_ATOMIC: u16 = 0x400;
pub const NLM_F_DUMP: u16 = NLM_F_ROOT | NLM_F_MATCH;

// Flags on error messages
pub const NLM_F_CAPPED: u16 = 0x100;
pub const NLM_F_ACK_TLVS: u16 = 0x200;

/// Extended-ack attribute types carried after the echoed request header.
pub const NLMSGERR_ATTR_MSG: u16 = 1;
pub const NLMSGERR_ATTR_OFFS: u16 = 2;
pub const NLMSGERR_ATTR_COOKIE: u16 = 3;
pub const NLMSGERR_ATTR_POLICY: u16 = 4;

/// Iterator over concatenated netlink messages in one receive datagram.
pub struct MessageIter<'a> {
    data: &'a [u8],
}

impl<'a> MessageIter<'a> {
    /// Create a new message iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<(&'a NlMsgHdr, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < NLMSG_HDRLEN {
            return None;
        }

        let header = match NlMsgHdr::from_bytes(self.data) {
            Ok(h) => h,
            Err(e) => return Some(Err(e)),
        };

        let msg_len = header.nlmsg_len as usize;
        if msg_len < NLMSG_HDRLEN || msg_len > self.data.len() {
            return Some(Err(Error::InvalidMessage(format!(
                "invalid message length: {}",
                msg_len
            ))));
        }

        let payload = &self.data[NLMSG_HDRLEN..msg_len];
        let aligned_len = nlmsg_align(msg_len);

        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Ok((header, payload)))
    }
}

/// Decode the payload of a DONE or ERROR message.
///
/// Returns `Ok(None)` for success, `Ok(Some(error))` for a kernel-reported
/// error. An **empty** payload is success: some kernels omit the trailing
/// error code on DUMP completion, a compatibility workaround rather than a
/// protocol guarantee.
///
/// When the header carries [`NLM_F_ACK_TLVS`], the extended-ack attributes
/// after the echoed request header are scanned and a `NLMSGERR_ATTR_MSG`
/// string is appended to the error text. With [`NLM_F_CAPPED`] only the
/// echoed header is present on the wire, so only the header is skipped.
pub fn decode_ack(header: &NlMsgHdr, payload: &[u8]) -> Result<Option<Error>> {
    if payload.is_empty() {
        return Ok(None);
    }
    if payload.len() < 4 {
        return Err(Error::Truncated {
            expected: 4,
            actual: payload.len(),
        });
    }

    let errno = i32::from_ne_bytes([payload[0], payload[1], payload[2], payload[3]]);
    if errno == 0 {
        return Ok(None);
    }

    let mut error = Error::from_errno(errno);

    let rest = &payload[4..];
    if header.nlmsg_flags & NLM_F_ACK_TLVS != 0 && rest.len() > NLMSG_HDRLEN {
        let echoed = NlMsgHdr::from_bytes(rest)?;
        let skip = if header.nlmsg_flags & NLM_F_CAPPED != 0 {
            NLMSG_HDRLEN
        } else {
            nlmsg_align(echoed.nlmsg_len as usize)
        };
        if skip < rest.len() {
            for item in AttrIter::new(&rest[skip..]) {
                let Ok((attr, value)) = item else {
                    // A malformed diagnostic attribute never masks the
                    // kernel's primary error code.
                    break;
                };
                if attr.kind() == NLMSGERR_ATTR_MSG
                    && let Ok(text) = super::attr::get::string(value)
                    && let Error::Kernel { message, .. } = &mut error
                {
                    let annotated = format!("{}: {}", message, text);
                    *message = annotated;
                }
            }
        }
    }

    Ok(Some(error))
}
