//! Netlink protocol support: wire types, socket, and request engine.
//!
//! Layered bottom-up: [`attr`] and [`message`] give the TLV and message
//! framing, [`builder`] constructs outgoing messages, [`socket`] owns the
//! blocking descriptor, [`transport`] runs full request/response exchanges,
//! and [`genl`] adds the generic netlink sub-header and family resolution.

pub mod attr;
pub mod builder;
pub mod error;
pub mod genl;
pub mod message;
pub mod socket;
pub mod transport;

pub use attr::{AttrIter, NestedWalk, NlAttr};
pub use builder::{MessageBuilder, NestToken};
pub use error::{Error, Result};
pub use message::{MessageIter, NlMsgHdr};
pub use socket::{NetlinkSocket, Protocol};
pub use transport::{NetlinkRequest, SocketHandle};
