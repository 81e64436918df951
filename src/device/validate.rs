//! Device validation before assembly.

use log::{debug, warn};

use crate::error::{DeviceError, Result};

use super::Device;

/// Validate a device for assembly.
///
/// Checks:
/// - Equation numbering has been established
/// - Every region owns at least one equation
///
/// Regions that are not touched by any contact are reported as warnings,
/// since their equations are only constrained through interfaces.
pub fn validate_device(device: &Device) -> Result<()> {
    if !device.is_numbered() {
        return Err(DeviceError::invalid_state(format!(
            "device '{}' has no base equation number",
            device.name()
        )));
    }

    if device.regions().is_empty() {
        debug!("device '{}' has no regions", device.name());
    }

    for region in device.regions().values() {
        if region.equation_count() == 0 {
            return Err(DeviceError::invalid_state(format!(
                "region '{}' owns no equations",
                region.name()
            )));
        }
        let contacted = device
            .contacts()
            .values()
            .any(|c| c.region_name() == region.name());
        if !contacted {
            warn!(
                "region '{}' on device '{}' has no contact",
                region.name(),
                device.name()
            );
        }
    }

    Ok(())
}
