//! Detector-Array Channel Grouping
//!
//! A pixel is one physical position on the focal plane carrying up to two
//! polarization channels in each of two frequency bands. Coincidence
//! detection only needs to know which channels belong to which pixel; the
//! geometry itself (positions, adjacency) stays with the instrument team.
//!
//! ## Pixel map file
//!
//! ```toml
//! [default]
//! pixels = [{ id = 0, f1 = [0, 1], f2 = [2, 3] }]
//!
//! [arrays.ar3]
//! excluded_channels = [17]
//! pixels = [
//!     { id = 0, f1 = [0, 1], f2 = [2, 3] },
//!     { id = 4, f1 = [4], f2 = [5, 6] },
//! ]
//! ```

use crate::cuts::ChannelId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::info;

/// Pixel identifier (by convention the smallest channel id of the pixel).
pub type PixelId = u32;

/// Maximum channels per frequency band of one pixel (two polarizations).
pub const MAX_CHANNELS_PER_BAND: usize = 2;

/// Provider of the channel → pixel grouping.
pub trait ChannelGrouping: Send + Sync {
    /// All pixels of the array, in ascending order.
    fn pixel_ids(&self) -> Vec<PixelId>;

    /// Low-frequency channels of a pixel (0–2 entries).
    fn low_freq_channels(&self, pixel: PixelId) -> Vec<ChannelId>;

    /// High-frequency channels of a pixel (0–2 entries).
    fn high_freq_channels(&self, pixel: PixelId) -> Vec<ChannelId>;
}

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("failed to read pixel map {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse pixel map {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("failed to serialize pixel map: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("pixel {pixel} lists {count} {band} channels (max 2)")]
    TooManyChannels {
        pixel: PixelId,
        band: &'static str,
        count: usize,
    },
    #[error("pixel {0} listed twice")]
    DuplicatePixel(PixelId),
}

// ============================================================================
// Pixel Map
// ============================================================================

/// Channels of one pixel, split by frequency band.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelChannels {
    /// Lower frequency band
    #[serde(default)]
    pub f1: Vec<ChannelId>,
    /// Higher frequency band
    #[serde(default)]
    pub f2: Vec<ChannelId>,
}

/// In-memory channel grouping for one array.
///
/// Channels in the exclusion set (dead or masked detectors) are hidden from
/// the grouping, so a pixel with a dead channel shows up with fewer channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelMap {
    pixels: BTreeMap<PixelId, PixelChannels>,
    excluded: BTreeSet<ChannelId>,
}

impl PixelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pixel, rejecting bands with more than two channels.
    pub fn insert(&mut self, pixel: PixelId, channels: PixelChannels) -> Result<(), GeometryError> {
        for (band, list) in [("f1", &channels.f1), ("f2", &channels.f2)] {
            if list.len() > MAX_CHANNELS_PER_BAND {
                return Err(GeometryError::TooManyChannels {
                    pixel,
                    band,
                    count: list.len(),
                });
            }
        }
        if self.pixels.contains_key(&pixel) {
            return Err(GeometryError::DuplicatePixel(pixel));
        }
        self.pixels.insert(pixel, channels);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_pixel(
        mut self,
        pixel: PixelId,
        f1: &[ChannelId],
        f2: &[ChannelId],
    ) -> Result<Self, GeometryError> {
        self.insert(
            pixel,
            PixelChannels {
                f1: f1.to_vec(),
                f2: f2.to_vec(),
            },
        )?;
        Ok(self)
    }

    /// Hide channels from the grouping.
    #[must_use]
    pub fn with_excluded<I: IntoIterator<Item = ChannelId>>(mut self, channels: I) -> Self {
        self.excluded.extend(channels);
        self
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    fn live(&self, channels: &[ChannelId]) -> Vec<ChannelId> {
        channels
            .iter()
            .copied()
            .filter(|ch| !self.excluded.contains(ch))
            .collect()
    }
}

impl ChannelGrouping for PixelMap {
    fn pixel_ids(&self) -> Vec<PixelId> {
        self.pixels.keys().copied().collect()
    }

    fn low_freq_channels(&self, pixel: PixelId) -> Vec<ChannelId> {
        self.pixels
            .get(&pixel)
            .map(|p| self.live(&p.f1))
            .unwrap_or_default()
    }

    fn high_freq_channels(&self, pixel: PixelId) -> Vec<ChannelId> {
        self.pixels
            .get(&pixel)
            .map(|p| self.live(&p.f2))
            .unwrap_or_default()
    }
}

// ============================================================================
// Pixel Catalog (per-array maps)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PixelEntry {
    id: PixelId,
    #[serde(default)]
    f1: Vec<ChannelId>,
    #[serde(default)]
    f2: Vec<ChannelId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ArrayFile {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    excluded_channels: Vec<ChannelId>,
    #[serde(default)]
    pixels: Vec<PixelEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<ArrayFile>,
    #[serde(default)]
    arrays: BTreeMap<String, ArrayFile>,
}

impl TryFrom<ArrayFile> for PixelMap {
    type Error = GeometryError;

    fn try_from(file: ArrayFile) -> Result<Self, Self::Error> {
        let mut map = Self::new().with_excluded(file.excluded_channels);
        for entry in file.pixels {
            map.insert(
                entry.id,
                PixelChannels {
                    f1: entry.f1,
                    f2: entry.f2,
                },
            )?;
        }
        Ok(map)
    }
}

impl From<&PixelMap> for ArrayFile {
    fn from(map: &PixelMap) -> Self {
        Self {
            excluded_channels: map.excluded.iter().copied().collect(),
            pixels: map
                .pixels
                .iter()
                .map(|(&id, ch)| PixelEntry {
                    id,
                    f1: ch.f1.clone(),
                    f2: ch.f2.clone(),
                })
                .collect(),
        }
    }
}

/// Pixel maps keyed by array name, with an optional fallback map.
///
/// Array names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct PixelCatalog {
    default: Option<PixelMap>,
    arrays: BTreeMap<String, PixelMap>,
}

impl PixelCatalog {
    /// Catalog that answers every array with the same map.
    pub fn single(map: PixelMap) -> Self {
        Self {
            default: Some(map),
            arrays: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_array(mut self, array: &str, map: PixelMap) -> Self {
        self.arrays.insert(array.to_lowercase(), map);
        self
    }

    /// Map for an array, falling back to the default map.
    pub fn resolve(&self, array: &str) -> Option<&PixelMap> {
        self.arrays
            .get(&array.to_lowercase())
            .or(self.default.as_ref())
    }

    /// Array names with a dedicated map, lowercased.
    pub fn arrays(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, GeometryError> {
        let file: CatalogFile =
            toml::from_str(raw).map_err(|e| GeometryError::Parse(origin.to_path_buf(), e))?;
        let default = file.default.map(PixelMap::try_from).transpose()?;
        let mut arrays = BTreeMap::new();
        for (name, array) in file.arrays {
            arrays.insert(name.to_lowercase(), PixelMap::try_from(array)?);
        }
        Ok(Self { default, arrays })
    }

    pub fn load(path: &Path) -> Result<Self, GeometryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GeometryError::Io(path.to_path_buf(), e))?;
        let catalog = Self::from_toml_str(&raw, path)?;
        info!(
            path = %path.display(),
            arrays = catalog.arrays.len(),
            has_default = catalog.default.is_some(),
            "Loaded pixel catalog"
        );
        Ok(catalog)
    }

    pub fn to_toml_string(&self) -> Result<String, GeometryError> {
        let file = CatalogFile {
            default: self.default.as_ref().map(ArrayFile::from),
            arrays: self
                .arrays
                .iter()
                .map(|(name, map)| (name.clone(), ArrayFile::from(map)))
                .collect(),
        };
        Ok(toml::to_string(&file)?)
    }
}
