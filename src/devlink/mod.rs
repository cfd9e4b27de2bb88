//! Devlink and mlxdevm command layer.
//!
//! Commands for the kernel's "devlink" generic netlink family and the
//! vendor "mlxdevm" family that mirrors it with an extended command set.
//! Every operation takes the family name as a selector string; anything
//! other than `"devlink"` or `"mlxdevm"` is rejected before a socket is
//! touched.

pub mod connection;
pub mod types;

pub use connection::Devlink;
pub use types::{
    Device, DeviceParam, EswitchAttrs, ParamType, Port, PortAddAttrs, PortFnCapSetAttrs,
    PortFnSetAttrs, PortFunction, PortFunctionCap,
};

/// The standard family name.
pub const FAMILY_DEVLINK: &str = "devlink";

/// The vendor family name with the extended command set.
pub const FAMILY_MLXDEVM: &str = "mlxdevm";

/// Protocol version both families register with.
pub const GENL_DEVLINK_VERSION: u8 = 1;

/// Devlink commands (genl sub-header `cmd` values).
pub mod cmd {
    pub const GET: u8 = 1;
    pub const PORT_GET: u8 = 5;
    pub const PORT_SET: u8 = 6;
    pub const PORT_NEW: u8 = 7;
    pub const PORT_DEL: u8 = 8;
    pub const ESWITCH_GET: u8 = 29;
    pub const ESWITCH_SET: u8 = 30;
    pub const PARAM_GET: u8 = 38;
    pub const PARAM_SET: u8 = 39;
    /// Port-function capability set, mlxdevm only.
    pub const EXT_CAP_SET: u8 = 45;
}

/// Devlink attribute types.
pub mod attr {
    pub const BUS_NAME: u16 = 1;
    pub const DEV_NAME: u16 = 2;
    pub const PORT_INDEX: u16 = 3;
    pub const PORT_TYPE: u16 = 4;
    pub const PORT_NETDEV_IFINDEX: u16 = 6;
    pub const PORT_NETDEV_NAME: u16 = 7;
    pub const PORT_IBDEV_NAME: u16 = 8;
    pub const ESWITCH_MODE: u16 = 25;
    pub const ESWITCH_INLINE_MODE: u16 = 26;
    pub const ESWITCH_ENCAP_MODE: u16 = 62;
    pub const PORT_FLAVOUR: u16 = 77;
    pub const PARAM: u16 = 80;
    pub const PARAM_NAME: u16 = 81;
    pub const PARAM_GENERIC: u16 = 82;
    pub const PARAM_TYPE: u16 = 83;
    pub const PARAM_VALUES_LIST: u16 = 84;
    pub const PARAM_VALUE: u16 = 85;
    pub const PARAM_VALUE_DATA: u16 = 86;
    pub const PARAM_VALUE_CMODE: u16 = 87;
    pub const PORT_PCI_PF_NUMBER: u16 = 127;
    pub const PORT_FUNCTION: u16 = 145;
    pub const PORT_CONTROLLER_NUMBER: u16 = 150;
    pub const PORT_PCI_SF_NUMBER: u16 = 164;
    /// Port-function capability container, mlxdevm only.
    pub const EXT_PORT_FN_CAP: u16 = 166;
}

/// Attributes nested inside the port-function container.
pub mod port_fn {
    pub const HW_ADDR: u16 = 1;
    pub const STATE: u16 = 2;
    pub const OPSTATE: u16 = 3;
    pub const TRUST_STATE: u16 = 4;
    /// Nested in the capability container, mlxdevm only.
    pub const EXT_CAP_ROCE: u16 = 5;
    pub const EXT_CAP_UC_LIST: u16 = 6;
}

/// Port flavours.
pub mod flavour {
    pub const PHYSICAL: u16 = 0;
    pub const CPU: u16 = 1;
    pub const DSA: u16 = 2;
    pub const PCI_PF: u16 = 3;
    pub const PCI_VF: u16 = 4;
    pub const VIRTUAL: u16 = 5;
    pub const UNUSED: u16 = 6;
    pub const PCI_SF: u16 = 7;
}

/// E-switch wire values.
pub mod eswitch {
    pub const MODE_LEGACY: u16 = 0;
    pub const MODE_SWITCHDEV: u16 = 1;

    pub const INLINE_MODE_NONE: u8 = 0;
    pub const INLINE_MODE_LINK: u8 = 1;
    pub const INLINE_MODE_NETWORK: u8 = 2;
    pub const INLINE_MODE_TRANSPORT: u8 = 3;

    pub const ENCAP_MODE_NONE: u8 = 0;
    pub const ENCAP_MODE_BASIC: u8 = 1;
}

/// Parameter configuration modes.
pub mod cmode {
    pub const RUNTIME: u8 = 0;
    pub const DRIVERINIT: u8 = 1;
    pub const PERMANENT: u8 = 2;
}

/// Port-function administrative and operational states.
pub mod port_fn_state {
    pub const INACTIVE: u8 = 0;
    pub const ACTIVE: u8 = 1;

    pub const OPSTATE_DETACHED: u8 = 0;
    pub const OPSTATE_ATTACHED: u8 = 1;
}
