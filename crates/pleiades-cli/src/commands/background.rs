use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use clap::Args;
use console::Style;

use pleiades_core::background::{make_background, BackgroundConfig};
use pleiades_core::ImageView;

use crate::input::load_image;

#[derive(Args)]
pub struct BackgroundArgs {
    /// Input image (raw little-endian f32, or 16-bit grayscale PNG/TIFF)
    pub file: PathBuf,

    /// Image width in pixels (raw input only)
    #[arg(long)]
    pub width: Option<usize>,

    /// Image height in pixels (raw input only)
    #[arg(long)]
    pub height: Option<usize>,

    /// Mesh cell size in pixels
    #[arg(long, default_value = "64")]
    pub cell: usize,

    /// Write the evaluated background surface as raw f32
    #[arg(long)]
    pub dump: Option<PathBuf>,
}

pub fn run(args: &BackgroundArgs) -> Result<()> {
    let im = load_image(&args.file, args.width, args.height)?;
    let view = ImageView::from_array(&im)?;
    let config = BackgroundConfig {
        cell_w: args.cell,
        cell_h: args.cell,
        ..BackgroundConfig::default()
    };
    let bkg = make_background(&view, &config)?;

    let nodes = bkg.back_nodes();
    let (min, max) = nodes.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    });

    let title = Style::new().cyan().bold();
    let label = Style::new().dim();
    let value = Style::new().bold().white();
    println!();
    println!("  {}", title.apply_to("Background"));
    println!(
        "  {:<14}{}",
        label.apply_to("Mesh"),
        value.apply_to(format!(
            "{}x{} cells of {}x{} px",
            bkg.grid_size().0,
            bkg.grid_size().1,
            args.cell,
            args.cell
        ))
    );
    println!(
        "  {:<14}{}",
        label.apply_to("Global"),
        value.apply_to(format!("{:.4} +/- {:.4}", bkg.global_back(), bkg.global_rms()))
    );
    println!(
        "  {:<14}{}",
        label.apply_to("Node range"),
        value.apply_to(format!("{min:.4} .. {max:.4}"))
    );
    println!();

    if let Some(dump) = &args.dump {
        let surface = bkg.back_array();
        let mut out = BufWriter::new(
            File::create(dump).with_context(|| format!("creating {}", dump.display()))?,
        );
        for &v in surface.iter() {
            out.write_f32::<LittleEndian>(v)?;
        }
        out.flush()?;
        println!("  background surface written to {}", dump.display());
    }
    Ok(())
}
