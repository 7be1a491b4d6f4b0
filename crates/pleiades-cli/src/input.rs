use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use ndarray::Array2;

/// Load an image as `f32`, shape `(height, width)`.
///
/// PNG/TIFF inputs are read as 16-bit grayscale; anything else is treated
/// as raw little-endian `f32` and requires explicit dimensions.
pub fn load_image(path: &Path, width: Option<usize>, height: Option<usize>) -> Result<Array2<f32>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" | "tif" | "tiff" => load_gray(path),
        _ => load_raw(path, width, height),
    }
}

fn load_gray(path: &Path) -> Result<Array2<f32>> {
    let img = image::open(path)
        .with_context(|| format!("opening image {}", path.display()))?
        .into_luma16();
    let (w, h) = img.dimensions();
    let mut out = Array2::<f32>::zeros((h as usize, w as usize));
    for (x, y, p) in img.enumerate_pixels() {
        out[[y as usize, x as usize]] = p.0[0] as f32;
    }
    Ok(out)
}

fn load_raw(path: &Path, width: Option<usize>, height: Option<usize>) -> Result<Array2<f32>> {
    let (w, h) = match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => bail!("raw input requires --width and --height"),
    };
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let expected = (w * h * 4) as u64;
    let actual = file.metadata()?.len();
    if actual != expected {
        bail!(
            "{} holds {actual} bytes, expected {expected} for {w}x{h} f32",
            path.display()
        );
    }
    let mut data = vec![0.0f32; w * h];
    BufReader::new(file)
        .read_f32_into::<LittleEndian>(&mut data)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(Array2::from_shape_vec((h, w), data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    #[test]
    fn test_raw_round_trip() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for i in 0..12 {
            f.write_f32::<LittleEndian>(i as f32).unwrap();
        }
        f.flush().unwrap();

        let im = load_image(f.path(), Some(4), Some(3)).unwrap();
        assert_eq!(im.dim(), (3, 4));
        assert_eq!(im[[0, 0]], 0.0);
        assert_eq!(im[[2, 3]], 11.0);
    }

    #[test]
    fn test_raw_requires_dimensions() {
        let f = tempfile::NamedTempFile::new().unwrap();
        assert!(load_image(f.path(), None, None).is_err());
    }

    #[test]
    fn test_raw_size_mismatch() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0u8; 10]).unwrap();
        f.flush().unwrap();
        assert!(load_image(f.path(), Some(4), Some(3)).is_err());
    }
}
