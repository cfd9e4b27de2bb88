//! Domain entities parsed from devlink attribute trees.

use super::{attr, cmode, eswitch, port_fn, port_fn_state};
use crate::netlink::attr::{AttrIter, NestedWalk, get};
use crate::netlink::error::{Error, Result};

/// E-switch attributes of a device. Each field is the string form of the
/// wire enum, `"unknown"` for values this client does not recognize and
/// empty when the kernel did not report the attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EswitchAttrs {
    /// `"legacy"` or `"switchdev"`.
    pub mode: String,
    /// `"none"`, `"link"`, `"network"` or `"transport"`.
    pub inline_mode: String,
    /// `"disable"` or `"enable"`.
    pub encap_mode: String,
}

/// A devlink device instance.
#[derive(Debug, Clone, Default)]
pub struct Device {
    /// Bus the device sits on, e.g. `"pci"` or `"auxiliary"`.
    pub bus_name: String,
    /// Bus-specific device name, e.g. `"0000:06:00.0"`.
    pub dev_name: String,
    /// E-switch configuration, filled by a follow-up query.
    pub eswitch: EswitchAttrs,
}

impl Device {
    /// Parse a device from a reply's attribute bytes.
    pub fn from_attrs(attrs: &[u8]) -> Result<Self> {
        let mut dev = Self::default();
        dev.merge_attrs(attrs)?;
        Ok(dev)
    }

    /// Merge attributes into an existing device. E-switch replies carry
    /// only the e-switch attributes, so this is additive.
    pub fn merge_attrs(&mut self, attrs: &[u8]) -> Result<()> {
        for item in AttrIter::new(attrs) {
            let (a, value) = item?;
            match a.kind() {
                attr::BUS_NAME => self.bus_name = get::string(value)?.to_string(),
                attr::DEV_NAME => self.dev_name = get::string(value)?.to_string(),
                attr::ESWITCH_MODE => {
                    self.eswitch.mode = eswitch_mode_name(get::u16_ne(value)?).to_string();
                }
                attr::ESWITCH_INLINE_MODE => {
                    self.eswitch.inline_mode =
                        eswitch_inline_mode_name(get::u8(value)?).to_string();
                }
                attr::ESWITCH_ENCAP_MODE => {
                    self.eswitch.encap_mode =
                        eswitch_encap_mode_name(get::u8(value)?).to_string();
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Port function attributes reported inside the port-function container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortFunction {
    /// Hardware address, 6 or more raw bytes.
    pub hw_addr: Vec<u8>,
    /// Administrative state.
    pub state: u8,
    /// Operational state.
    pub op_state: u8,
    /// Trust level, when the kernel reports one.
    pub trust: Option<u8>,
}

/// Port function capabilities, mlxdevm only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortFunctionCap {
    /// RDMA over converged ethernet enabled.
    pub roce: bool,
    /// Unicast MAC address list size limit.
    pub max_uc_macs: u32,
}

/// A devlink port instance.
#[derive(Debug, Clone, Default)]
pub struct Port {
    pub bus_name: String,
    pub dev_name: String,
    /// Port index, unique within a device.
    pub port_index: u32,
    pub port_type: u16,
    /// Associated netdevice name, empty when none is registered.
    pub netdev_name: String,
    pub netdev_ifindex: u32,
    /// Associated RDMA device name, empty when none is registered.
    pub rdma_dev_name: String,
    /// Port flavour, one of the [`super::flavour`] values.
    pub flavour: u16,
    /// Controller number, when reported.
    pub controller: Option<u32>,
    /// PCI physical function number, when reported.
    pub pf_number: Option<u16>,
    /// PCI sub-function number, when reported.
    pub sf_number: Option<u32>,
    /// Port function attributes, when reported.
    pub function: Option<PortFunction>,
    /// Port function capabilities, when reported.
    pub function_cap: Option<PortFunctionCap>,
}

impl Port {
    /// Parse a port from a reply's attribute bytes.
    pub fn from_attrs(attrs: &[u8]) -> Result<Self> {
        let mut port = Self::default();
        for item in AttrIter::new(attrs) {
            let (a, value) = item?;
            match a.kind() {
                attr::BUS_NAME => port.bus_name = get::string(value)?.to_string(),
                attr::DEV_NAME => port.dev_name = get::string(value)?.to_string(),
                attr::PORT_INDEX => port.port_index = get::u32_ne(value)?,
                attr::PORT_TYPE => port.port_type = get::u16_ne(value)?,
                attr::PORT_NETDEV_NAME => {
                    port.netdev_name = get::string(value)?.to_string();
                }
                attr::PORT_NETDEV_IFINDEX => port.netdev_ifindex = get::u32_ne(value)?,
                attr::PORT_IBDEV_NAME => {
                    port.rdma_dev_name = get::string(value)?.to_string();
                }
                attr::PORT_FLAVOUR => port.flavour = get::u16_ne(value)?,
                attr::PORT_CONTROLLER_NUMBER => port.controller = Some(get::u32_ne(value)?),
                attr::PORT_PCI_PF_NUMBER => port.pf_number = Some(get::u16_ne(value)?),
                attr::PORT_PCI_SF_NUMBER => port.sf_number = Some(get::u32_ne(value)?),
                _ => {
                    if a.is_nested() {
                        port.parse_function_attrs(value)?;
                    }
                }
            }
        }
        Ok(port)
    }

    fn parse_function_attrs(&mut self, data: &[u8]) -> Result<()> {
        for item in AttrIter::new(data) {
            let (a, value) = item?;
            match a.kind() {
                port_fn::HW_ADDR => {
                    self.function.get_or_insert_with(Default::default).hw_addr = value.to_vec();
                }
                port_fn::STATE => {
                    self.function.get_or_insert_with(Default::default).state = get::u8(value)?;
                }
                port_fn::OPSTATE => {
                    self.function.get_or_insert_with(Default::default).op_state = get::u8(value)?;
                }
                port_fn::TRUST_STATE => {
                    self.function.get_or_insert_with(Default::default).trust =
                        Some(get::u8(value)?);
                }
                port_fn::EXT_CAP_ROCE => {
                    self.function_cap.get_or_insert_with(Default::default).roce =
                        get::u8(value)? != 0;
                }
                port_fn::EXT_CAP_UC_LIST => {
                    self.function_cap
                        .get_or_insert_with(Default::default)
                        .max_uc_macs = get::u32_ne(value)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Attributes for adding a port. `None` fields are omitted from the wire
/// message entirely; zero is a valid value, not an "unset" sentinel.
#[derive(Debug, Clone, Default)]
pub struct PortAddAttrs {
    /// PCI physical function number, always sent.
    pub pf_number: u16,
    /// Sub-function number, sent only for the PCI-SF flavour.
    pub sf_number: Option<u32>,
    /// Requested port index.
    pub port_index: Option<u32>,
    /// Controller number.
    pub controller: Option<u32>,
}

/// Port function fields to set. `None` fields are left untouched by the
/// kernel and absent from the wire message.
#[derive(Debug, Clone, Default)]
pub struct PortFnSetAttrs {
    pub hw_addr: Option<Vec<u8>>,
    pub state: Option<u8>,
    pub trust: Option<u8>,
}

/// Port function capability fields to set, mlxdevm only.
#[derive(Debug, Clone, Default)]
pub struct PortFnCapSetAttrs {
    pub roce: Option<bool>,
    pub max_uc_macs: Option<u32>,
}

/// Declared value type of a device parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParamType {
    U8 = 1,
    U16 = 2,
    U32 = 3,
    U64 = 4,
    String = 5,
    Flag = 6,
}

impl ParamType {
    /// Map a wire value to a parameter type.
    pub fn from_wire(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::U8),
            2 => Ok(Self::U16),
            3 => Ok(Self::U32),
            4 => Ok(Self::U64),
            5 => Ok(Self::String),
            6 => Ok(Self::Flag),
            other => Err(Error::InvalidAttribute(format!(
                "unknown parameter type {}",
                other
            ))),
        }
    }

    /// Wire value of this type.
    pub fn to_wire(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::String => "string",
            Self::Flag => "flag",
        }
    }
}

/// A device parameter snapshot.
#[derive(Debug, Clone)]
pub struct DeviceParam {
    /// Parameter name.
    pub name: String,
    /// Declared value type.
    pub param_type: ParamType,
    /// Configuration mode the value applies in, one of [`super::cmode`].
    pub cmode: u8,
    /// Raw value bytes. A flag parameter holds a single byte, 1 when the
    /// flag is set.
    pub value: Vec<u8>,
}

impl DeviceParam {
    /// Parse a parameter from a reply's attribute bytes.
    ///
    /// The reply nests the interesting attributes several levels deep
    /// (parameter container, value list, value entry), so this walks the
    /// whole tree and picks out the recognized types wherever they sit.
    /// A flag parameter's value is presence-encoded: true exactly when a
    /// zero-length value-data attribute exists inside the value container.
    pub fn from_attrs(attrs: &[u8]) -> Result<Self> {
        let mut name = String::new();
        let mut param_type: Option<ParamType> = None;
        let mut cmode = 0u8;
        let mut value_data: Option<Vec<u8>> = None;

        for item in NestedWalk::new(attrs) {
            let (a, value) = item?;
            match a.kind() {
                attr::PARAM_NAME => name = get::string(value)?.to_string(),
                attr::PARAM_TYPE => {
                    param_type = Some(ParamType::from_wire(get::u8(value)?)?);
                }
                attr::PARAM_VALUE_CMODE => cmode = get::u8(value)?,
                attr::PARAM_VALUE_DATA => value_data = Some(value.to_vec()),
                _ => {}
            }
        }

        let param_type = param_type.ok_or_else(|| {
            Error::InvalidMessage("parameter reply carries no type attribute".into())
        })?;

        let value = match param_type {
            ParamType::Flag => vec![u8::from(value_data.is_some())],
            _ => value_data.unwrap_or_default(),
        };

        Ok(Self {
            name,
            param_type,
            cmode,
            value,
        })
    }

    /// Render the value as text, the inverse of the set-side parsing.
    pub fn value_string(&self) -> Result<String> {
        match self.param_type {
            ParamType::U8 => Ok(get::u8(&self.value)?.to_string()),
            ParamType::U16 => Ok(get::u16_ne(&self.value)?.to_string()),
            ParamType::U32 => Ok(get::u32_ne(&self.value)?.to_string()),
            ParamType::U64 => Ok(get::u64_ne(&self.value)?.to_string()),
            ParamType::String => Ok(get::string(&self.value)?.to_string()),
            ParamType::Flag => Ok((get::u8(&self.value)? != 0).to_string()),
        }
    }
}

/// String form of a port-function administrative state.
pub fn port_fn_state_name(state: u8) -> &'static str {
    match state {
        port_fn_state::INACTIVE => "inactive",
        port_fn_state::ACTIVE => "active",
        _ => "unknown",
    }
}

/// String form of a port-function operational state.
pub fn port_fn_opstate_name(op_state: u8) -> &'static str {
    match op_state {
        port_fn_state::OPSTATE_DETACHED => "detached",
        port_fn_state::OPSTATE_ATTACHED => "attached",
        _ => "unknown",
    }
}

/// String form of an e-switch mode wire value.
pub fn eswitch_mode_name(mode: u16) -> &'static str {
    match mode {
        eswitch::MODE_LEGACY => "legacy",
        eswitch::MODE_SWITCHDEV => "switchdev",
        _ => "unknown",
    }
}

/// Wire value of an e-switch mode string. Only the two real modes are
/// accepted; anything else is a caller error.
pub fn eswitch_mode_from_name(name: &str) -> Result<u16> {
    match name {
        "legacy" => Ok(eswitch::MODE_LEGACY),
        "switchdev" => Ok(eswitch::MODE_SWITCHDEV),
        _ => Err(Error::InvalidEswitchMode { mode: name.into() }),
    }
}

/// String form of an e-switch inline mode wire value.
pub fn eswitch_inline_mode_name(mode: u8) -> &'static str {
    match mode {
        eswitch::INLINE_MODE_NONE => "none",
        eswitch::INLINE_MODE_LINK => "link",
        eswitch::INLINE_MODE_NETWORK => "network",
        eswitch::INLINE_MODE_TRANSPORT => "transport",
        _ => "unknown",
    }
}

/// String form of an e-switch encapsulation mode wire value.
pub fn eswitch_encap_mode_name(mode: u8) -> &'static str {
    match mode {
        eswitch::ENCAP_MODE_NONE => "disable",
        eswitch::ENCAP_MODE_BASIC => "enable",
        _ => "unknown",
    }
}

/// String form of a parameter configuration mode.
pub fn cmode_name(mode: u8) -> &'static str {
    match mode {
        cmode::RUNTIME => "runtime",
        cmode::DRIVERINIT => "driverinit",
        cmode::PERMANENT => "permanent",
        _ => "unknown",
    }
}

/// Wire value of a configuration-mode string. Only the two settable modes
/// are accepted.
pub fn cmode_from_name(name: &str) -> Result<u8> {
    match name {
        "runtime" => Ok(cmode::RUNTIME),
        "driverinit" => Ok(cmode::DRIVERINIT),
        _ => Err(Error::InvalidConfigMode { cmode: name.into() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devlink::flavour;
    use crate::netlink::builder::MessageBuilder;
    use crate::netlink::message::NLMSG_HDRLEN;

    fn attrs_of(builder: MessageBuilder) -> Vec<u8> {
        builder.finish()[NLMSG_HDRLEN..].to_vec()
    }

    #[test]
    fn test_parse_device() {
        let mut b = MessageBuilder::new(0x18, 0);
        b.append_attr_str(attr::BUS_NAME, "pci");
        b.append_attr_str(attr::DEV_NAME, "0000:06:00.0");
        b.append_attr_u16(attr::ESWITCH_MODE, eswitch::MODE_SWITCHDEV);
        b.append_attr_u8(attr::ESWITCH_INLINE_MODE, eswitch::INLINE_MODE_NONE);
        b.append_attr_u8(attr::ESWITCH_ENCAP_MODE, eswitch::ENCAP_MODE_BASIC);

        let dev = Device::from_attrs(&attrs_of(b)).unwrap();
        assert_eq!(dev.bus_name, "pci");
        assert_eq!(dev.dev_name, "0000:06:00.0");
        assert_eq!(dev.eswitch.mode, "switchdev");
        assert_eq!(dev.eswitch.inline_mode, "none");
        assert_eq!(dev.eswitch.encap_mode, "enable");
    }

    #[test]
    fn test_unrecognized_enum_values_fall_back_to_unknown() {
        let mut b = MessageBuilder::new(0x18, 0);
        b.append_attr_u16(attr::ESWITCH_MODE, 77);
        b.append_attr_u8(attr::ESWITCH_INLINE_MODE, 77);
        b.append_attr_u8(attr::ESWITCH_ENCAP_MODE, 77);

        let dev = Device::from_attrs(&attrs_of(b)).unwrap();
        assert_eq!(dev.eswitch.mode, "unknown");
        assert_eq!(dev.eswitch.inline_mode, "unknown");
        assert_eq!(dev.eswitch.encap_mode, "unknown");
    }

    #[test]
    fn test_parse_port_with_function() {
        let mut b = MessageBuilder::new(0x18, 0);
        b.append_attr_str(attr::BUS_NAME, "pci");
        b.append_attr_str(attr::DEV_NAME, "0000:06:00.0");
        b.append_attr_u32(attr::PORT_INDEX, 32768);
        b.append_attr_u16(attr::PORT_FLAVOUR, flavour::PCI_SF);
        b.append_attr_str(attr::PORT_NETDEV_NAME, "eth0");
        b.append_attr_u32(attr::PORT_NETDEV_IFINDEX, 42);
        b.append_attr_u16(attr::PORT_PCI_PF_NUMBER, 0);
        b.append_attr_u32(attr::PORT_PCI_SF_NUMBER, 99);
        let nest = b.nest_start(attr::PORT_FUNCTION);
        b.append_attr(port_fn::HW_ADDR, &[0, 1, 2, 3, 4, 5]);
        b.append_attr_u8(port_fn::STATE, 1);
        b.append_attr_u8(port_fn::OPSTATE, 1);
        b.append_attr_u8(port_fn::TRUST_STATE, 1);
        b.nest_end(nest);

        let port = Port::from_attrs(&attrs_of(b)).unwrap();
        assert_eq!(port.port_index, 32768);
        assert_eq!(port.flavour, flavour::PCI_SF);
        assert_eq!(port.netdev_name, "eth0");
        assert_eq!(port.netdev_ifindex, 42);
        assert_eq!(port.pf_number, Some(0));
        assert_eq!(port.sf_number, Some(99));
        let function = port.function.unwrap();
        assert_eq!(function.hw_addr, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(function.state, 1);
        assert_eq!(function.op_state, 1);
        assert_eq!(function.trust, Some(1));
        assert!(port.function_cap.is_none());
    }

    #[test]
    fn test_parse_port_without_function() {
        let mut b = MessageBuilder::new(0x18, 0);
        b.append_attr_u32(attr::PORT_INDEX, 1);
        b.append_attr_u16(attr::PORT_FLAVOUR, flavour::PHYSICAL);

        let port = Port::from_attrs(&attrs_of(b)).unwrap();
        assert!(port.function.is_none());
        assert!(port.controller.is_none());
        assert!(port.sf_number.is_none());
    }

    #[test]
    fn test_parse_port_function_cap() {
        let mut b = MessageBuilder::new(0x18, 0);
        let nest = b.nest_start(attr::EXT_PORT_FN_CAP);
        b.append_attr_u8(port_fn::EXT_CAP_ROCE, 1);
        b.append_attr_u32(port_fn::EXT_CAP_UC_LIST, 64);
        b.nest_end(nest);

        let port = Port::from_attrs(&attrs_of(b)).unwrap();
        let cap = port.function_cap.unwrap();
        assert!(cap.roce);
        assert_eq!(cap.max_uc_macs, 64);
    }

    fn param_reply(name: &str, param_type: ParamType, data: Option<&[u8]>) -> Vec<u8> {
        let mut b = MessageBuilder::new(0x18, 0);
        let param = b.nest_start(attr::PARAM);
        b.append_attr_str(attr::PARAM_NAME, name);
        b.append_attr_u8(attr::PARAM_TYPE, param_type.to_wire());
        let list = b.nest_start(attr::PARAM_VALUES_LIST);
        let value = b.nest_start(attr::PARAM_VALUE);
        b.append_attr_u8(attr::PARAM_VALUE_CMODE, cmode::RUNTIME);
        if let Some(data) = data {
            b.append_attr(attr::PARAM_VALUE_DATA, data);
        }
        b.nest_end(value);
        b.nest_end(list);
        b.nest_end(param);
        attrs_of(b)
    }

    #[test]
    fn test_parse_u32_param() {
        let attrs = param_reply("max_sfs", ParamType::U32, Some(&128u32.to_ne_bytes()));
        let param = DeviceParam::from_attrs(&attrs).unwrap();
        assert_eq!(param.name, "max_sfs");
        assert_eq!(param.param_type, ParamType::U32);
        assert_eq!(param.cmode, cmode::RUNTIME);
        assert_eq!(param.value_string().unwrap(), "128");
    }

    #[test]
    fn test_parse_flag_param_present_is_true() {
        let attrs = param_reply("disable_netdev", ParamType::Flag, Some(&[]));
        let param = DeviceParam::from_attrs(&attrs).unwrap();
        assert_eq!(param.value, vec![1]);
        assert_eq!(param.value_string().unwrap(), "true");
    }

    #[test]
    fn test_parse_flag_param_absent_is_false() {
        let attrs = param_reply("disable_netdev", ParamType::Flag, None);
        let param = DeviceParam::from_attrs(&attrs).unwrap();
        assert_eq!(param.value, vec![0]);
        assert_eq!(param.value_string().unwrap(), "false");
    }

    #[test]
    fn test_parse_string_param() {
        let attrs = param_reply("fw_bundle", ParamType::String, Some(b"auto\0"));
        let param = DeviceParam::from_attrs(&attrs).unwrap();
        assert_eq!(param.value_string().unwrap(), "auto");
    }

    #[test]
    fn test_mode_name_round_trips() {
        assert_eq!(eswitch_mode_from_name("legacy").unwrap(), eswitch::MODE_LEGACY);
        assert_eq!(
            eswitch_mode_from_name("switchdev").unwrap(),
            eswitch::MODE_SWITCHDEV
        );
        assert!(matches!(
            eswitch_mode_from_name("bogus"),
            Err(Error::InvalidEswitchMode { .. })
        ));
    }

    #[test]
    fn test_port_fn_state_names() {
        assert_eq!(port_fn_state_name(port_fn_state::ACTIVE), "active");
        assert_eq!(port_fn_opstate_name(port_fn_state::OPSTATE_ATTACHED), "attached");
        assert_eq!(port_fn_state_name(9), "unknown");
        assert_eq!(port_fn_opstate_name(9), "unknown");
    }

    #[test]
    fn test_cmode_names() {
        assert_eq!(cmode_name(cmode::RUNTIME), "runtime");
        assert_eq!(cmode_name(cmode::PERMANENT), "permanent");
        assert_eq!(cmode_name(9), "unknown");
        assert!(matches!(
            cmode_from_name("permanent"),
            Err(Error::InvalidConfigMode { .. })
        ));
    }
}
