//! Generic netlink family resolution via the controller family.

use std::collections::HashMap;
use std::sync::Arc;

use super::header::GenlMsgHdr;
use super::{CtrlAttr, CtrlAttrMcastGrp, CtrlCmd, GENL_ID_CTRL};
use crate::netlink::attr::{AttrIter, get};
use crate::netlink::error::{Error, Result};
use crate::netlink::socket::Protocol;
use crate::netlink::transport::{NetlinkRequest, SocketHandle};

/// Controller protocol version used on GETFAMILY queries.
const GENL_CTRL_VERSION: u8 = 2;

/// A resolved generic netlink family.
#[derive(Debug, Clone)]
pub struct Family {
    /// Registered family name.
    pub name: String,
    /// Dynamic numeric id, used as the netlink message type for this
    /// family's commands.
    pub id: u16,
    /// Protocol version the family registered with.
    pub version: u8,
    /// Multicast group name to group id.
    pub mcast_groups: HashMap<String, u32>,
}

impl Family {
    /// Look up a multicast group id by name.
    pub fn group_id(&self, name: &str) -> Option<u32> {
        self.mcast_groups.get(name).copied()
    }
}

/// Resolve a family name to its id and version by querying the generic
/// netlink controller.
///
/// An ENOENT from the controller means no such family is registered and is
/// reported as [`Error::FamilyNotFound`]. With `shared` the query runs over
/// the given handle; otherwise a private socket is used.
pub fn resolve(name: &str, shared: Option<&Arc<SocketHandle>>) -> Result<Family> {
    let mut req = NetlinkRequest::new(GENL_ID_CTRL, 0);
    req.append(&GenlMsgHdr::new(CtrlCmd::GetFamily as u8, GENL_CTRL_VERSION));
    req.append_attr_str(CtrlAttr::FamilyName as u16, name);

    if let Some(handle) = shared {
        req = req.with_shared(Arc::clone(handle));
    }

    let payloads = req.execute(Protocol::Generic).map_err(|e| {
        if e.errno() == Some(libc::ENOENT) {
            Error::FamilyNotFound { name: name.into() }
        } else {
            e
        }
    })?;

    let payload = payloads.first().ok_or_else(|| Error::FamilyNotFound {
        name: name.into(),
    })?;

    let family = parse_family(payload)?;
    tracing::debug!(
        name = %family.name,
        id = family.id,
        version = family.version,
        "resolved generic netlink family"
    );
    Ok(family)
}

/// Parse a GETFAMILY reply payload (genl header plus controller attributes).
fn parse_family(payload: &[u8]) -> Result<Family> {
    let (_, attrs) = GenlMsgHdr::from_bytes(payload)?;

    let mut name = String::new();
    let mut id: Option<u16> = None;
    let mut version: u8 = 0;
    let mut mcast_groups = HashMap::new();

    for item in AttrIter::new(attrs) {
        let (attr, value) = item?;
        match attr.kind() {
            k if k == CtrlAttr::FamilyId as u16 => id = Some(get::u16_ne(value)?),
            k if k == CtrlAttr::FamilyName as u16 => name = get::string(value)?.to_string(),
            k if k == CtrlAttr::Version as u16 => version = get::u32_ne(value)? as u8,
            k if k == CtrlAttr::McastGroups as u16 => {
                mcast_groups = parse_mcast_groups(value)?;
            }
            _ => {}
        }
    }

    let id = id.ok_or_else(|| {
        Error::InvalidMessage("family reply carries no family id".into())
    })?;

    Ok(Family {
        name,
        id,
        version,
        mcast_groups,
    })
}

fn parse_mcast_groups(data: &[u8]) -> Result<HashMap<String, u32>> {
    let mut groups = HashMap::new();

    // Each child is an index-typed nest holding name and id.
    for entry in AttrIter::new(data) {
        let (_, entry_value) = entry?;
        let mut name: Option<String> = None;
        let mut group_id: Option<u32> = None;
        for item in AttrIter::new(entry_value) {
            let (attr, value) = item?;
            match attr.kind() {
                k if k == CtrlAttrMcastGrp::Name as u16 => {
                    name = Some(get::string(value)?.to_string());
                }
                k if k == CtrlAttrMcastGrp::Id as u16 => group_id = Some(get::u32_ne(value)?),
                _ => {}
            }
        }
        if let (Some(name), Some(group_id)) = (name, group_id) {
            groups.insert(name, group_id);
        }
    }

    Ok(groups)
}
