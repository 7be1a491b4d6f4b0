use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use clap::Args;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Args)]
pub struct SynthArgs {
    /// Output file (raw little-endian f32)
    pub output: PathBuf,

    #[arg(long, default_value = "256")]
    pub width: usize,

    #[arg(long, default_value = "256")]
    pub height: usize,

    /// Number of synthetic stars
    #[arg(long, default_value = "50")]
    pub stars: usize,

    /// Sky level added to every pixel
    #[arg(long, default_value = "100.0")]
    pub sky: f32,

    /// Gaussian noise sigma
    #[arg(long, default_value = "1.0")]
    pub noise: f32,

    /// Brightest star peak above the sky
    #[arg(long, default_value = "100.0")]
    pub peak: f32,

    /// RNG seed
    #[arg(long, default_value = "42")]
    pub seed: u64,
}

pub fn run(args: &SynthArgs) -> Result<()> {
    let (w, h) = (args.width, args.height);
    if w < 32 || h < 32 {
        anyhow::bail!("field must be at least 32x32 pixels");
    }
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut im = Array2::<f32>::from_elem((h, w), args.sky);

    let margin = 8.0;
    for _ in 0..args.stars {
        let xc = rng.gen_range(margin..w as f64 - margin);
        let yc = rng.gen_range(margin..h as f64 - margin);
        let sigma = rng.gen_range(1.0..2.5);
        let peak = args.peak * rng.gen_range(0.05..1.0f32);
        add_gaussian(&mut im, xc, yc, sigma, peak);
    }

    if args.noise > 0.0 {
        for v in im.iter_mut() {
            *v += args.noise * gauss(&mut rng) as f32;
        }
    }

    let mut out = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("creating {}", args.output.display()))?,
    );
    for &v in im.iter() {
        out.write_f32::<LittleEndian>(v)?;
    }
    out.flush()?;

    println!(
        "wrote {} ({}x{}, {} stars); detect with:\n  pleiades detect {} --width {} --height {}",
        args.output.display(),
        w,
        h,
        args.stars,
        args.output.display(),
        w,
        h
    );
    Ok(())
}

fn add_gaussian(im: &mut Array2<f32>, xc: f64, yc: f64, sigma: f64, peak: f32) {
    let (h, w) = im.dim();
    let reach = (5.0 * sigma).ceil() as i64;
    let x0 = (xc.round() as i64 - reach).max(0);
    let x1 = (xc.round() as i64 + reach).min(w as i64 - 1);
    let y0 = (yc.round() as i64 - reach).max(0);
    let y1 = (yc.round() as i64 + reach).min(h as i64 - 1);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f64 - xc;
            let dy = y as f64 - yc;
            let g = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            im[[y as usize, x as usize]] += peak * g as f32;
        }
    }
}

/// Standard normal sample via Box-Muller.
fn gauss(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
