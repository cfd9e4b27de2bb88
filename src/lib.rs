//! Synchronous devlink/mlxdevm generic netlink client for Linux.
//!
//! This crate manages network-device switching behavior and port lifecycle
//! through the kernel's "devlink" generic netlink family and the vendor
//! "mlxdevm" family that mirrors it with an extended command set. It covers
//! device enumeration, e-switch mode switching, port and sub-function
//! lifecycle, port-function attributes, and device parameters, plus the
//! sysfs fallback for the two sub-function operations devlink cannot do.
//!
//! All calls are blocking; socket timeouts (60s by default) bound every
//! exchange. No background threads, no async runtime.
//!
//! # Example
//!
//! ```ignore
//! use mlxdevm::devlink::{Devlink, PortAddAttrs, flavour};
//!
//! fn main() -> mlxdevm::Result<()> {
//!     let devlink = Devlink::with_shared_socket()?;
//!
//!     for dev in devlink.device_list("mlxdevm")? {
//!         println!("{}/{}: {}", dev.bus_name, dev.dev_name, dev.eswitch.mode);
//!     }
//!
//!     let port = devlink.port_add(
//!         "mlxdevm",
//!         "pci",
//!         "0000:06:00.0",
//!         flavour::PCI_SF,
//!         &PortAddAttrs {
//!             pf_number: 0,
//!             sf_number: Some(99),
//!             ..Default::default()
//!         },
//!     )?;
//!     println!("created port index {}", port.port_index);
//!
//!     devlink.close();
//!     Ok(())
//! }
//! ```

pub mod devlink;
pub mod netlink;
pub mod sysfs;

pub use devlink::Devlink;
pub use netlink::{Error, Result};
