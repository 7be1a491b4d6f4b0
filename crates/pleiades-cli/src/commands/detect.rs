use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::info;

use pleiades_core::aperture::{kron_radius, sum_circle, sum_ellipse};
use pleiades_core::background::make_background;
use pleiades_core::convolve::Kernel;
use pleiades_core::extract::{extract, Source};
use pleiades_core::{ImageView, Noise};

use crate::catalog::{write_catalog, CatalogRow};
use crate::config::{DetectParams, PhotometryConfig};
use crate::input::load_image;

#[derive(Args)]
pub struct DetectArgs {
    /// Input image (raw little-endian f32, or 16-bit grayscale PNG/TIFF)
    pub file: PathBuf,

    /// Output catalog file
    #[arg(short, long, default_value = "catalog.txt")]
    pub output: PathBuf,

    /// Image width in pixels (raw input only)
    #[arg(long)]
    pub width: Option<usize>,

    /// Image height in pixels (raw input only)
    #[arg(long)]
    pub height: Option<usize>,

    /// TOML parameter file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Detection threshold in units of the global background RMS
    #[arg(long, default_value = "1.5")]
    pub sigma: f32,

    /// Skip the matched-filter convolution
    #[arg(long)]
    pub no_filter: bool,
}

pub fn run(args: &DetectArgs) -> Result<()> {
    let params = DetectParams::load(args.config.as_deref())?;
    let mut im = load_image(&args.file, args.width, args.height)?;
    let (h, w) = im.dim();

    // Background model, then in-place subtraction.
    let bkg = {
        let view = ImageView::from_array(&im)?;
        make_background(&view, &params.background)?
    };
    let (global_back, global_rms) = (bkg.global_back(), bkg.global_rms());
    info!(global_back, global_rms, "background estimated");
    bkg.subtract_array(&mut im)?;

    let view = ImageView::from_array(&im)?.with_noise(Noise::Const { rms: global_rms })?;

    let mut extract_cfg = params.extract.clone();
    extract_cfg.thresh = args.sigma * global_rms;
    let kernel = Kernel::default_filter();
    let kernel_ref = if args.no_filter { None } else { Some(&kernel) };
    let sources = extract(&view, kernel_ref, &extract_cfg)?;

    let rows = measure_sources(&view, &sources, &params.photometry)?;

    let mut out = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("creating {}", args.output.display()))?,
    );
    write_catalog(&mut out, &rows)?;

    print_summary(args, (w, h), global_back, global_rms, rows.len());
    Ok(())
}

/// Fixed-aperture and AUTO photometry for every source. This is the
/// caller-side parallel loop: each aperture runs on one thread.
fn measure_sources(
    view: &ImageView,
    sources: &[Source],
    phot: &PhotometryConfig,
) -> Result<Vec<CatalogRow>> {
    let pb = ProgressBar::new(sources.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    pb.set_message("Measuring");

    let rows = sources
        .par_iter()
        .enumerate()
        .map(|(index, s)| {
            let circle = sum_circle(view, s.x, s.y, phot.radius, phot.subpix)?;

            let (kron, kflag) = kron_radius(
                view,
                s.x,
                s.y,
                s.cxx as f64,
                s.cyy as f64,
                s.cxy as f64,
                phot.kron_rmax,
            )?;
            // Degenerate Kron radii fall back to the fixed aperture.
            let (kron_aper, flux_auto, fluxerr_auto, aflag) = if kron > 0.0 {
                let auto = sum_ellipse(
                    view,
                    s.x,
                    s.y,
                    s.a as f64,
                    s.b as f64,
                    s.theta as f64,
                    phot.auto_scale * kron,
                    phot.subpix.max(1),
                )?;
                (phot.auto_scale * kron, auto.flux, auto.fluxerr, auto.flag)
            } else {
                (0.0, circle.flux, circle.fluxerr, 0)
            };

            pb.inc(1);
            Ok(CatalogRow {
                index,
                x: s.x,
                y: s.y,
                flux: circle.flux,
                fluxerr: circle.fluxerr,
                kron_aper,
                flux_auto,
                fluxerr_auto,
                flags: s.flag | circle.flag | kflag | aflag,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    pb.finish_and_clear();
    Ok(rows)
}

fn print_summary(
    args: &DetectArgs,
    dims: (usize, usize),
    global_back: f32,
    global_rms: f32,
    nsources: usize,
) {
    let title = Style::new().cyan().bold();
    let label = Style::new().dim();
    let value = Style::new().bold().white();

    println!();
    println!("  {}", title.apply_to("Detection"));
    println!(
        "  {:<14}{}",
        label.apply_to("Input"),
        value.apply_to(format!("{} ({}x{})", args.file.display(), dims.0, dims.1))
    );
    println!(
        "  {:<14}{}",
        label.apply_to("Background"),
        value.apply_to(format!("{global_back:.4} +/- {global_rms:.4}"))
    );
    println!(
        "  {:<14}{}",
        label.apply_to("Threshold"),
        value.apply_to(format!("{:.4}", args.sigma * global_rms))
    );
    println!(
        "  {:<14}{}",
        label.apply_to("Sources"),
        value.apply_to(nsources)
    );
    println!(
        "  {:<14}{}",
        label.apply_to("Catalog"),
        value.apply_to(args.output.display())
    );
    println!();
}
