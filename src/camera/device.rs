//! Camera device enumeration and device-spec parsing.

use std::fmt;
use std::str::FromStr;

use nokhwa::query;
use nokhwa::utils::{ApiBackend, CameraIndex};

use super::types::{CameraError, CameraInfo};

/// How a capture device is identified on the command line.
///
/// `--device 0` selects an indexed device, while `--device jetson` names a
/// platform backend (the onboard CSI camera on the robot).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    /// Numeric device index (e.g. `/dev/video0`)
    Index(u32),
    /// Named backend identifier
    Named(String),
}

impl Default for DeviceSpec {
    fn default() -> Self {
        DeviceSpec::Named("jetson".to_string())
    }
}

impl FromStr for DeviceSpec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<u32>() {
            Ok(index) => Ok(DeviceSpec::Index(index)),
            Err(_) => Ok(DeviceSpec::Named(s.to_string())),
        }
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSpec::Index(i) => write!(f, "{}", i),
            DeviceSpec::Named(name) => write!(f, "{}", name),
        }
    }
}

impl DeviceSpec {
    /// Convert to the nokhwa camera index.
    pub fn to_camera_index(&self) -> CameraIndex {
        match self {
            DeviceSpec::Index(i) => CameraIndex::Index(*i),
            DeviceSpec::Named(name) => CameraIndex::String(name.clone()),
        }
    }
}

/// List all available camera devices on the system.
///
/// Returns a vector of `CameraInfo` structs, or an error if querying fails.
/// If no cameras are found, returns an empty vector (not an error).
pub fn list_devices() -> Result<Vec<CameraInfo>, CameraError> {
    let devices = query(ApiBackend::Auto).map_err(|e| CameraError::QueryFailed(e.to_string()))?;

    Ok(devices
        .into_iter()
        .map(|d| CameraInfo {
            index: d.index().as_index().unwrap_or(0),
            name: d.human_name(),
            description: d.description().to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_spec_parses_index() {
        let spec: DeviceSpec = "2".parse().unwrap();
        assert_eq!(spec, DeviceSpec::Index(2));
    }

    #[test]
    fn test_device_spec_parses_name() {
        let spec: DeviceSpec = "jetson".parse().unwrap();
        assert_eq!(spec, DeviceSpec::Named("jetson".to_string()));
    }

    #[test]
    fn test_device_spec_default_is_jetson() {
        assert_eq!(DeviceSpec::default(), DeviceSpec::Named("jetson".to_string()));
    }

    #[test]
    fn test_device_spec_display_round_trip() {
        assert_eq!(format!("{}", DeviceSpec::Index(3)), "3");
        assert_eq!(
            format!("{}", DeviceSpec::Named("jetson".to_string())),
            "jetson"
        );
    }
}
