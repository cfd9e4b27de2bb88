//! Sysfs fallback for sub-function operations devlink cannot perform.
//!
//! Two gaps in the mlxdevm family are bridged through plain sysfs files:
//! mapping a sub-function number to its auxiliary device name, and moving a
//! sub-function from its configuration driver to its functional driver.
//! Both are single-line text reads/writes; file-permission errors surface
//! as plain I/O errors.

use std::fs;
use std::path::{Path, PathBuf};

use crate::netlink::error::{Error, Result};

/// Directory listing all auxiliary devices.
pub const AUX_DEV_DIR: &str = "/sys/bus/auxiliary/devices";

/// Unbind control file of the sub-function configuration driver.
pub const SF_CFG_UNBIND: &str = "/sys/bus/auxiliary/drivers/mlx5_core.sf_cfg/unbind";

/// Bind control file of the functional sub-function driver.
pub const SF_BIND: &str = "/sys/bus/auxiliary/drivers/mlx5_core.sf/bind";

/// Sysfs locations used by the fallback operations. The default points at
/// the real sysfs; tests substitute a scratch directory.
#[derive(Debug, Clone)]
pub struct SysfsPaths {
    pub aux_dev_dir: PathBuf,
    pub sf_cfg_unbind: PathBuf,
    pub sf_bind: PathBuf,
}

impl Default for SysfsPaths {
    fn default() -> Self {
        Self {
            aux_dev_dir: PathBuf::from(AUX_DEV_DIR),
            sf_cfg_unbind: PathBuf::from(SF_CFG_UNBIND),
            sf_bind: PathBuf::from(SF_BIND),
        }
    }
}

/// Find the auxiliary device name (e.g. `mlx5_core.sf.3`) for a
/// sub-function number.
///
/// The sub-function must be active before its auxiliary device appears.
pub fn sf_aux_device(sfnum: u32) -> Result<String> {
    sf_aux_device_at(&SysfsPaths::default(), sfnum)
}

/// [`sf_aux_device`] against explicit sysfs locations.
pub fn sf_aux_device_at(paths: &SysfsPaths, sfnum: u32) -> Result<String> {
    let entries = fs::read_dir(&paths.aux_dev_dir)?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        // Devices of other kinds carry no sfnum file; skip them.
        match fs::read_to_string(entry.path().join("sfnum")) {
            Ok(contents) if matches_sfnum(&contents, sfnum) => {
                return Ok(name.to_string());
            }
            _ => {}
        }
    }
    Err(Error::AuxDevNotFound { sfnum })
}

fn matches_sfnum(contents: &str, sfnum: u32) -> bool {
    contents.trim() == sfnum.to_string()
}

/// Move a sub-function from the configuration driver to the functional
/// driver, flipping its operational state from detached to attached.
///
/// Equivalent to writing the auxiliary device name into the sf_cfg unbind
/// file and then into the sf bind file. The sub-function must already be
/// configured and active.
pub fn deploy_sf(aux_dev: &str) -> Result<()> {
    deploy_sf_at(&SysfsPaths::default(), aux_dev)
}

/// [`deploy_sf`] against explicit sysfs locations.
pub fn deploy_sf_at(paths: &SysfsPaths, aux_dev: &str) -> Result<()> {
    write_control(&paths.sf_cfg_unbind, aux_dev)?;
    write_control(&paths.sf_bind, aux_dev)?;
    tracing::debug!(aux_dev, "sub-function moved to functional driver");
    Ok(())
}

fn write_control(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).map_err(Error::from)
}
