//! Raw Recording Acquisition
//!
//! Loading a unit's raw samples and turning them into per-channel cuts both
//! sit behind traits: [`RecordingLoader`] stands in for whatever reads the
//! instrument's files and [`FlagDetector`] for whatever decides which
//! samples are anomalous. The built-in implementations cover tests, the
//! synthetic demo and simple deployments.

mod detector;
mod loader;

pub use detector::{FlagDetector, ThresholdFlagDetector};
pub use loader::{InMemoryLoader, JsonDirLoader, RecordingLoader};

use crate::cuts::ChannelId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Acquisition errors
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("recording not found: {0}")]
    NotFound(String),

    #[error("failed to read recording {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode recording {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("channel {channel} has {actual} samples, recording has {expected}")]
    LengthMismatch {
        channel: ChannelId,
        expected: usize,
        actual: usize,
    },
}

/// Sample series of every channel of one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub nsamps: usize,
    #[serde(default)]
    pub channels: BTreeMap<ChannelId, Vec<f64>>,
}

impl Recording {
    pub fn new(nsamps: usize) -> Self {
        Self {
            nsamps,
            channels: BTreeMap::new(),
        }
    }

    /// Add a channel whose length must equal `nsamps`.
    pub fn with_channel(mut self, channel: ChannelId, samples: Vec<f64>) -> Result<Self, AcquisitionError> {
        self.insert(channel, samples)?;
        Ok(self)
    }

    pub fn insert(&mut self, channel: ChannelId, samples: Vec<f64>) -> Result<(), AcquisitionError> {
        if samples.len() != self.nsamps {
            return Err(AcquisitionError::LengthMismatch {
                channel,
                expected: self.nsamps,
                actual: samples.len(),
            });
        }
        self.channels.insert(channel, samples);
        Ok(())
    }

    /// Check every channel against `nsamps` (for deserialized recordings).
    pub fn validate(&self) -> Result<(), AcquisitionError> {
        for (&channel, samples) in &self.channels {
            if samples.len() != self.nsamps {
                return Err(AcquisitionError::LengthMismatch {
                    channel,
                    expected: self.nsamps,
                    actual: samples.len(),
                });
            }
        }
        Ok(())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_rejected() {
        let err = Recording::new(4).with_channel(1, vec![0.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::LengthMismatch { channel: 1, expected: 4, actual: 3 }
        ));
    }

    #[test]
    fn test_validate_deserialized() {
        let rec: Recording =
            serde_json::from_str(r#"{"nsamps": 2, "channels": {"0": [1.0, 2.0], "1": [1.0]}}"#).unwrap();
        assert!(rec.validate().is_err());
    }
}
