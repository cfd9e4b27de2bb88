//! Generic netlink (genl) support.
//!
//! Generic netlink multiplexes many protocol families over one netlink
//! protocol number. Families register by name and get a dynamic numeric id;
//! [`family::resolve`] asks the controller family for that id before any
//! family command can be sent.

pub mod family;
pub mod header;

pub use family::Family;
pub use header::{GENL_HDRLEN, GenlMsgHdr};

/// The generic netlink controller's own, fixed family id.
pub const GENL_ID_CTRL: u16 = 0x10;

/// Controller commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CtrlCmd {
    /// Unspecified.
    Unspec = 0,
    /// New family notification.
    NewFamily = 1,
    /// Family removed notification.
    DelFamily = 2,
    /// Get family information by name or id.
    GetFamily = 3,
}

/// Controller attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CtrlAttr {
    /// Unspecified.
    Unspec = 0,
    /// Family ID (u16).
    FamilyId = 1,
    /// Family name (string).
    FamilyName = 2,
    /// Protocol version (u32).
    Version = 3,
    /// Header size (u32).
    HdrSize = 4,
    /// Maximum attribute number (u32).
    MaxAttr = 5,
    /// Supported operations (nested).
    Ops = 6,
    /// Multicast groups (nested).
    McastGroups = 7,
}

/// Attributes nested inside each multicast-group entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CtrlAttrMcastGrp {
    /// Unspecified.
    Unspec = 0,
    /// Group name (string).
    Name = 1,
    /// Group ID (u32).
    Id = 2,
}
