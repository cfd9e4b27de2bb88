//! Devlink command execution.
//!
//! [`Devlink`] issues commands either over per-exchange private sockets
//! (the default) or over one shared socket handle for sequential command
//! batches. The family id is re-resolved per command; resolution is a
//! single cheap controller query and keeping no cache means a re-registered
//! family (driver reload) is picked up transparently.

use std::sync::Arc;

use super::types::{
    Device, DeviceParam, ParamType, Port, PortAddAttrs, PortFnCapSetAttrs, PortFnSetAttrs,
    cmode_from_name, eswitch_mode_from_name,
};
use super::{FAMILY_DEVLINK, FAMILY_MLXDEVM, GENL_DEVLINK_VERSION, attr, cmd, flavour, port_fn};
use crate::netlink::error::{Error, Result};
use crate::netlink::genl::header::GenlMsgHdr;
use crate::netlink::genl::{Family, family};
use crate::netlink::message::{NLM_F_ACK, NLM_F_DUMP};
use crate::netlink::socket::Protocol;
use crate::netlink::transport::{NetlinkRequest, SocketHandle};

/// Handle for devlink and mlxdevm commands.
pub struct Devlink {
    shared: Option<Arc<SocketHandle>>,
}

impl Devlink {
    /// Create a handle that opens a private socket per exchange.
    pub fn new() -> Self {
        Self { shared: None }
    }

    /// Create a handle with its own shared generic netlink socket, reused
    /// across all commands issued through it.
    pub fn with_shared_socket() -> Result<Self> {
        Ok(Self {
            shared: Some(SocketHandle::new(Protocol::Generic)?),
        })
    }

    /// Create a handle over an existing shared socket.
    pub fn from_handle(handle: Arc<SocketHandle>) -> Self {
        Self {
            shared: Some(handle),
        }
    }

    /// Close the shared socket, if any. Commands issued afterwards fail
    /// with `SocketClosed`.
    pub fn close(&self) {
        if let Some(handle) = &self.shared {
            handle.close();
        }
    }

    fn resolve(&self, socket_name: &str) -> Result<Family> {
        validate_selector(socket_name)?;
        family::resolve(socket_name, self.shared.as_ref())
    }

    fn attach(&self, req: NetlinkRequest) -> NetlinkRequest {
        match &self.shared {
            Some(handle) => req.with_shared(Arc::clone(handle)),
            None => req,
        }
    }

    fn execute(&self, req: NetlinkRequest) -> Result<Vec<Vec<u8>>> {
        self.attach(req).execute(Protocol::Generic)
    }

    /// List all devices of the selected family, with e-switch attributes
    /// filled in where the kernel reports them.
    pub fn device_list(&self, socket_name: &str) -> Result<Vec<Device>> {
        let family = self.resolve(socket_name)?;
        let payloads = self.execute(dump_request(family.id, cmd::GET))?;

        let mut devices = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            let (_, attrs) = GenlMsgHdr::from_bytes(payload)?;
            devices.push(Device::from_attrs(attrs)?);
        }

        for dev in &mut devices {
            self.fetch_eswitch_attrs(&family, dev);
        }
        Ok(devices)
    }

    /// Look up one device by bus and device name.
    pub fn device_by_name(&self, socket_name: &str, bus: &str, device: &str) -> Result<Device> {
        let family = self.resolve(socket_name)?;
        let payloads = self.execute(command_request(family.id, cmd::GET, bus, device))?;
        let mut dev = Device::from_attrs(first_attrs(&payloads)?)?;
        self.fetch_eswitch_attrs(&family, &mut dev);
        Ok(dev)
    }

    /// E-switch attributes are a separate command and not all devices have
    /// an e-switch, so a failure here degrades to empty attributes rather
    /// than failing the device lookup.
    fn fetch_eswitch_attrs(&self, family: &Family, dev: &mut Device) {
        let req = command_request(family.id, cmd::ESWITCH_GET, &dev.bus_name, &dev.dev_name);
        match self.execute(req) {
            Ok(payloads) => {
                if let Err(e) =
                    first_attrs(&payloads).and_then(|attrs| dev.merge_attrs(attrs))
                {
                    tracing::debug!(
                        device = %dev.dev_name,
                        error = %e,
                        "malformed eswitch reply"
                    );
                }
            }
            Err(e) => {
                tracing::debug!(
                    device = %dev.dev_name,
                    error = %e,
                    "eswitch attributes unavailable"
                );
            }
        }
    }

    /// Set the e-switch mode of a device to `"legacy"` or `"switchdev"`.
    /// Any other mode string is rejected before a request is built.
    pub fn eswitch_set(
        &self,
        socket_name: &str,
        bus: &str,
        device: &str,
        mode: &str,
    ) -> Result<()> {
        let wire_mode = eswitch_mode_from_name(mode)?;
        let family = self.resolve(socket_name)?;
        let mut req = command_request(family.id, cmd::ESWITCH_SET, bus, device);
        req.append_attr_u16(attr::ESWITCH_MODE, wire_mode);
        self.execute(req)?;
        Ok(())
    }

    /// List all ports across all devices of the selected family.
    pub fn port_list(&self, socket_name: &str) -> Result<Vec<Port>> {
        let family = self.resolve(socket_name)?;
        let payloads = self.execute(dump_request(family.id, cmd::PORT_GET))?;

        let mut ports = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            let (_, attrs) = GenlMsgHdr::from_bytes(payload)?;
            ports.push(Port::from_attrs(attrs)?);
        }
        Ok(ports)
    }

    /// Look up one port by device and port index.
    pub fn port_by_index(
        &self,
        socket_name: &str,
        bus: &str,
        device: &str,
        port_index: u32,
    ) -> Result<Port> {
        let family = self.resolve(socket_name)?;
        let mut req = command_request(family.id, cmd::PORT_GET, bus, device);
        req.append_attr_u32(attr::PORT_INDEX, port_index);
        let payloads = self.execute(req)?;
        Port::from_attrs(first_attrs(&payloads)?)
    }

    /// Add a port with the given flavour and return the created port as
    /// the kernel reports it.
    pub fn port_add(
        &self,
        socket_name: &str,
        bus: &str,
        device: &str,
        port_flavour: u16,
        attrs: &PortAddAttrs,
    ) -> Result<Port> {
        let family = self.resolve(socket_name)?;
        let req = port_add_request(family.id, bus, device, port_flavour, attrs);
        let payloads = self.execute(req)?;
        Port::from_attrs(first_attrs(&payloads)?)
    }

    /// Delete a port by device and port index.
    pub fn port_del(
        &self,
        socket_name: &str,
        bus: &str,
        device: &str,
        port_index: u32,
    ) -> Result<()> {
        let family = self.resolve(socket_name)?;
        let mut req = command_request(family.id, cmd::PORT_DEL, bus, device);
        req.append_attr_u32(attr::PORT_INDEX, port_index);
        self.execute(req)?;
        Ok(())
    }

    /// Set port-function attributes. Only the fields present in `fn_attrs`
    /// go on the wire; the kernel leaves the rest untouched.
    pub fn port_fn_set(
        &self,
        socket_name: &str,
        bus: &str,
        device: &str,
        port_index: u32,
        fn_attrs: &PortFnSetAttrs,
    ) -> Result<()> {
        let family = self.resolve(socket_name)?;
        let req = port_fn_set_request(family.id, bus, device, port_index, fn_attrs);
        self.execute(req)?;
        Ok(())
    }

    /// Set port-function capabilities, mlxdevm only. Same optional-field
    /// discipline as [`port_fn_set`](Self::port_fn_set).
    pub fn port_fn_cap_set(
        &self,
        socket_name: &str,
        bus: &str,
        device: &str,
        port_index: u32,
        cap_attrs: &PortFnCapSetAttrs,
    ) -> Result<()> {
        let family = self.resolve(socket_name)?;
        let req = port_fn_cap_set_request(family.id, bus, device, port_index, cap_attrs);
        self.execute(req)?;
        Ok(())
    }

    /// Read one device parameter by name.
    pub fn param_get(
        &self,
        socket_name: &str,
        bus: &str,
        device: &str,
        param_name: &str,
    ) -> Result<DeviceParam> {
        let family = self.resolve(socket_name)?;
        let mut req = command_request(family.id, cmd::PARAM_GET, bus, device);
        req.append_attr_str(attr::PARAM_NAME, param_name);
        let payloads = self.execute(req)?;
        DeviceParam::from_attrs(first_attrs(&payloads)?)
    }

    /// Set a device parameter from its textual value.
    ///
    /// The set command must echo the parameter's declared type, so the
    /// parameter is read back first and `value` is validated against that
    /// type before anything is sent. `config_mode` is `"runtime"` or
    /// `"driverinit"`.
    pub fn param_set(
        &self,
        socket_name: &str,
        bus: &str,
        device: &str,
        param_name: &str,
        value: &str,
        config_mode: &str,
    ) -> Result<()> {
        let cmode_wire = cmode_from_name(config_mode)?;
        let current = self.param_get(socket_name, bus, device, param_name)?;

        let family = self.resolve(socket_name)?;
        let req = param_set_request(
            family.id,
            bus,
            device,
            param_name,
            current.param_type,
            value,
            cmode_wire,
        )?;
        self.execute(req)?;
        Ok(())
    }
}

impl Default for Devlink {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject any selector other than the two known family names, before any
/// socket work happens.
fn validate_selector(socket_name: &str) -> Result<()> {
    if socket_name == FAMILY_DEVLINK || socket_name == FAMILY_MLXDEVM {
        Ok(())
    } else {
        Err(Error::InvalidSocketName {
            name: socket_name.into(),
        })
    }
}

/// A request carrying the genl sub-header and the bus/device selector.
fn command_request(family_id: u16, command: u8, bus: &str, device: &str) -> NetlinkRequest {
    let mut req = NetlinkRequest::new(family_id, NLM_F_ACK);
    req.append(&GenlMsgHdr::new(command, GENL_DEVLINK_VERSION));
    req.append_attr_str(attr::BUS_NAME, bus);
    req.append_attr_str(attr::DEV_NAME, device);
    req
}

/// A dump request, no selector: the kernel returns all objects.
fn dump_request(family_id: u16, command: u8) -> NetlinkRequest {
    let mut req = NetlinkRequest::new(family_id, NLM_F_ACK | NLM_F_DUMP);
    req.append(&GenlMsgHdr::new(command, GENL_DEVLINK_VERSION));
    req
}

fn port_add_request(
    family_id: u16,
    bus: &str,
    device: &str,
    port_flavour: u16,
    attrs: &PortAddAttrs,
) -> NetlinkRequest {
    let mut req = command_request(family_id, cmd::PORT_NEW, bus, device);
    req.append_attr_u16(attr::PORT_FLAVOUR, port_flavour);
    req.append_attr_u16(attr::PORT_PCI_PF_NUMBER, attrs.pf_number);
    if port_flavour == flavour::PCI_SF {
        if let Some(sf_number) = attrs.sf_number {
            req.append_attr_u32(attr::PORT_PCI_SF_NUMBER, sf_number);
        }
    }
    if let Some(port_index) = attrs.port_index {
        req.append_attr_u32(attr::PORT_INDEX, port_index);
    }
    if let Some(controller) = attrs.controller {
        req.append_attr_u32(attr::PORT_CONTROLLER_NUMBER, controller);
    }
    req
}

fn port_fn_set_request(
    family_id: u16,
    bus: &str,
    device: &str,
    port_index: u32,
    fn_attrs: &PortFnSetAttrs,
) -> NetlinkRequest {
    let mut req = command_request(family_id, cmd::PORT_SET, bus, device);
    req.append_attr_u32(attr::PORT_INDEX, port_index);

    let nest = req.nest_start(attr::PORT_FUNCTION);
    if let Some(hw_addr) = &fn_attrs.hw_addr {
        req.append_attr(port_fn::HW_ADDR, hw_addr);
    }
    if let Some(state) = fn_attrs.state {
        req.append_attr_u8(port_fn::STATE, state);
    }
    if let Some(trust) = fn_attrs.trust {
        req.append_attr_u8(port_fn::TRUST_STATE, trust);
    }
    req.nest_end(nest);
    req
}

fn port_fn_cap_set_request(
    family_id: u16,
    bus: &str,
    device: &str,
    port_index: u32,
    cap_attrs: &PortFnCapSetAttrs,
) -> NetlinkRequest {
    let mut req = command_request(family_id, cmd::EXT_CAP_SET, bus, device);
    req.append_attr_u32(attr::PORT_INDEX, port_index);

    let nest = req.nest_start(attr::EXT_PORT_FN_CAP);
    if let Some(roce) = cap_attrs.roce {
        req.append_attr_u8(port_fn::EXT_CAP_ROCE, u8::from(roce));
    }
    if let Some(max_uc_macs) = cap_attrs.max_uc_macs {
        req.append_attr_u32(port_fn::EXT_CAP_UC_LIST, max_uc_macs);
    }
    req.nest_end(nest);
    req
}

fn param_set_request(
    family_id: u16,
    bus: &str,
    device: &str,
    param_name: &str,
    param_type: ParamType,
    value: &str,
    cmode_wire: u8,
) -> Result<NetlinkRequest> {
    let mut req = command_request(family_id, cmd::PARAM_SET, bus, device);
    req.append_attr_str(attr::PARAM_NAME, param_name);
    req.append_attr_u8(attr::PARAM_TYPE, param_type.to_wire());
    req.append_attr_u8(attr::PARAM_VALUE_CMODE, cmode_wire);
    append_param_value(&mut req, param_type, value)?;
    Ok(req)
}

/// Validate `value` against the parameter's declared type and append the
/// value-data attribute. A flag parameter is presence-encoded: `"true"`
/// appends a zero-length attribute, `"false"` appends nothing, and any
/// other literal is rejected.
fn append_param_value(req: &mut NetlinkRequest, param_type: ParamType, value: &str) -> Result<()> {
    let invalid = |expected: &'static str| Error::InvalidParamValue {
        value: value.into(),
        expected,
    };
    match param_type {
        ParamType::U8 => {
            let v: u8 = value.parse().map_err(|_| invalid("u8"))?;
            req.append_attr_u8(attr::PARAM_VALUE_DATA, v);
        }
        ParamType::U16 => {
            let v: u16 = value.parse().map_err(|_| invalid("u16"))?;
            req.append_attr_u16(attr::PARAM_VALUE_DATA, v);
        }
        ParamType::U32 => {
            let v: u32 = value.parse().map_err(|_| invalid("u32"))?;
            req.append_attr_u32(attr::PARAM_VALUE_DATA, v);
        }
        ParamType::U64 => {
            let v: u64 = value.parse().map_err(|_| invalid("u64"))?;
            req.append_attr_u64(attr::PARAM_VALUE_DATA, v);
        }
        ParamType::String => {
            req.append_attr_str(attr::PARAM_VALUE_DATA, value);
        }
        ParamType::Flag => match value {
            "true" => req.append_attr_empty(attr::PARAM_VALUE_DATA),
            "false" => {}
            _ => return Err(invalid("flag")),
        },
    }
    Ok(())
}

fn first_attrs(payloads: &[Vec<u8>]) -> Result<&[u8]> {
    let payload = payloads
        .first()
        .ok_or_else(|| Error::InvalidMessage("empty reply to a get command".into()))?;
    let (_, attrs) = GenlMsgHdr::from_bytes(payload)?;
    Ok(attrs)
}
