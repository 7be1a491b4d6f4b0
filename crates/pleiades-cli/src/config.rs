use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use pleiades_core::background::BackgroundConfig;
use pleiades_core::extract::ExtractConfig;

/// Fixed-aperture and AUTO photometry settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotometryConfig {
    /// Fixed circular aperture radius in pixels.
    pub radius: f64,
    /// Sub-pixel sampling grid (0 = exact for circles).
    pub subpix: u32,
    /// Kron integration limit in elliptical radii.
    pub kron_rmax: f64,
    /// AUTO aperture size in Kron radii.
    pub auto_scale: f64,
}

impl Default for PhotometryConfig {
    fn default() -> Self {
        Self {
            radius: 5.0,
            subpix: 5,
            kron_rmax: 6.0,
            auto_scale: 2.5,
        }
    }
}

/// Full parameter set for the detect command, loadable from TOML.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectParams {
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub photometry: PhotometryConfig,
}

impl DetectParams {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("parsing config {}", p.display()))
            }
        }
    }
}
