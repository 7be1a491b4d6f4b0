//! Source extraction: threshold classification, connected-component
//! scanning, deblending and cleaning.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::buffer::ImageView;
use crate::consts::{DEBLEND_NTHRESH_MAX, DEBLEND_NTHRESH_MIN, DEFAULT_PIXEL_STACK};
use crate::convolve::Kernel;
use crate::error::{PleiadesError, Result};

mod analyse;
mod clean;
mod components;
mod deblend;
mod object;
mod plist;
mod scan;

pub use object::{flags, Source};

/// How the `thresh` option is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ThreshKind {
    /// `thresh` is in pixel units.
    #[default]
    Absolute,
    /// `thresh` scales the per-pixel RMS of the noise companion.
    Relative,
}

/// Which plane the threshold comparison runs on when a kernel is given.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FilterKind {
    /// Threshold the convolved values directly.
    #[default]
    Conv,
    /// Threshold the convolved values divided by the noise of the filtered
    /// plane (matched-filter SNR). Requires a noise companion; behaves as
    /// `Conv` without one.
    Matched,
}

/// Parameters for source extraction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Detection threshold, in units chosen by `thresh_kind`.
    pub thresh: f32,
    #[serde(default)]
    pub thresh_kind: ThreshKind,
    /// Minimum footprint size in pixels (default: 5).
    pub minarea: usize,
    #[serde(default)]
    pub filter_kind: FilterKind,
    /// Number of deblending levels, 2..=64 (default: 32).
    pub deblend_nthresh: usize,
    /// Deblending contrast ratio in (0, 1] (default: 0.005).
    pub deblend_cont: f64,
    /// Merge marginal neighbors after extraction (default: true).
    pub clean: bool,
    /// Moffat exponent of the cleaning profile test (default: 1.0).
    pub clean_param: f64,
    /// Capacity of the pixel-list arena in records (default: 300000).
    pub pixel_stack: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            thresh: 1.5,
            thresh_kind: ThreshKind::Absolute,
            minarea: 5,
            filter_kind: FilterKind::Conv,
            deblend_nthresh: 32,
            deblend_cont: 0.005,
            clean: true,
            clean_param: 1.0,
            pixel_stack: DEFAULT_PIXEL_STACK,
        }
    }
}

impl ExtractConfig {
    fn validate(&self) -> Result<()> {
        if self.minarea == 0 {
            return Err(PleiadesError::IllegalArgument(
                "minarea must be at least 1".into(),
            ));
        }
        if self.deblend_nthresh < DEBLEND_NTHRESH_MIN
            || self.deblend_nthresh > DEBLEND_NTHRESH_MAX
        {
            return Err(PleiadesError::IllegalArgument(format!(
                "deblend_nthresh must be in [{DEBLEND_NTHRESH_MIN}, {DEBLEND_NTHRESH_MAX}], \
                 got {}",
                self.deblend_nthresh
            )));
        }
        if !(self.deblend_cont > 0.0 && self.deblend_cont <= 1.0) {
            return Err(PleiadesError::IllegalArgument(format!(
                "deblend_cont must be in (0, 1], got {}",
                self.deblend_cont
            )));
        }
        if self.clean && self.clean_param <= 0.0 {
            return Err(PleiadesError::IllegalArgument(format!(
                "clean_param must be positive, got {}",
                self.clean_param
            )));
        }
        if self.pixel_stack == 0 {
            return Err(PleiadesError::IllegalArgument(
                "pixel_stack must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Extract sources from `image`.
///
/// The image should already be background-subtracted when thresholds are
/// absolute. `kernel`, when given, is applied as a matched filter before
/// thresholding.
pub fn extract(
    image: &ImageView,
    kernel: Option<&Kernel>,
    config: &ExtractConfig,
) -> Result<Vec<Source>> {
    config.validate()?;

    let mut objlist = scan::scan_image(image, kernel, config)?;
    if config.clean && objlist.objects.len() > 1 {
        clean::clean(&mut objlist, config.clean_param);
    }

    let sources: Vec<Source> = objlist.objects.iter().map(Source::from_raw).collect();
    info!(
        sources = sources.len(),
        thresh = objlist.thresh,
        "extraction complete"
    );
    Ok(sources)
}
