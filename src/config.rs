//! Capture settings, loaded from a [ron] file and overridden from the
//! command line. A config file looks like:
//!
//! ```text
//! (
//!     baud_rate: 115200,
//!     sample_rate_hz: 215,
//!     data_type: Rms,
//!     output_dir: "recordings",
//!     resync_limit: None,
//!     export_queue_depth: 256,
//! )
//! ```
//!
//! Missing fields take their defaults.

use crate::error::EmgError;
use crate::protocol::{DataType, DEVICE_SAMPLE_RATE_HZ};

use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

/// Everything a capture needs to know before it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Serial port speed
    pub baud_rate: u32,
    /// Rate used to interpolate CSV timestamps
    pub sample_rate_hz: u32,
    /// Which processing stage the device should send
    pub data_type: DataType,
    /// Where exports land
    pub output_dir: PathBuf,
    /// Bytes the assembler may discard per chunk while resyncing. `None`
    /// lets it search the whole pending buffer. Must not be `Some(0)`.
    pub resync_limit: Option<usize>,
    /// Pieces of CSV text the export queue holds before dropping
    pub export_queue_depth: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            sample_rate_hz: DEVICE_SAMPLE_RATE_HZ,
            data_type: DataType::default(),
            output_dir: PathBuf::from("."),
            resync_limit: None,
            export_queue_depth: 256,
        }
    }
}

impl CaptureConfig {
    /// Read a config from a RON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EmgError> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Parse a config from RON text.
    pub fn from_ron(text: &str) -> Result<Self, EmgError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall a capture.
    pub fn validate(&self) -> Result<(), EmgError> {
        if self.resync_limit == Some(0) {
            return Err(EmgError::InvalidConfig(
                "resync_limit must be at least 1".to_owned(),
            ));
        }
        if self.export_queue_depth == 0 {
            return Err(EmgError::InvalidConfig(
                "export_queue_depth must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Render as pretty RON, e.g. to seed a config file.
    pub fn to_ron(&self) -> Result<String, EmgError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_hardware() {
        let cfg = CaptureConfig::default();
        assert_eq!(cfg.sample_rate_hz, 215);
        assert_eq!(cfg.baud_rate, 115200);
        assert_eq!(cfg.data_type, DataType::Filtered);
        assert_eq!(cfg.resync_limit, None);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = CaptureConfig::from_ron("(data_type: Rms, resync_limit: Some(512))").unwrap();
        assert_eq!(cfg.data_type, DataType::Rms);
        assert_eq!(cfg.resync_limit, Some(512));
        assert_eq!(cfg.baud_rate, 115200);
    }

    #[test]
    fn ron_round_trip_through_a_file() {
        let cfg = CaptureConfig {
            output_dir: PathBuf::from("recordings"),
            export_queue_depth: 8,
            ..CaptureConfig::default()
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(cfg.to_ron().unwrap().as_bytes()).unwrap();

        assert_eq!(CaptureConfig::from_path(file.path()).unwrap(), cfg);
    }

    #[test]
    fn garbage_is_a_ron_error() {
        assert!(matches!(
            CaptureConfig::from_ron("(baud_rate: \"fast\")"),
            Err(EmgError::RonSpanned(_))
        ));
    }

    #[test]
    fn zero_resync_limit_is_rejected() {
        assert!(matches!(
            CaptureConfig::from_ron("(resync_limit: Some(0))"),
            Err(EmgError::InvalidConfig(_))
        ));
        assert!(CaptureConfig::from_ron("(resync_limit: Some(1))").is_ok());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            CaptureConfig::from_path("/definitely/not/here.ron"),
            Err(EmgError::Io(_))
        ));
    }
}
