use ndarray::Array2;
use num_traits::AsPrimitive;

use crate::consts::MAX_DIMENSION;
use crate::error::{PleiadesError, Result};

/// Borrowed, row-major pixel data in one of the supported element types.
///
/// All kernels consume pixels as `f32`; conversion happens row-wise through
/// a monomorphic copy loop bound once per call.
#[derive(Clone, Copy, Debug)]
pub enum PixelData<'a> {
    F32(&'a [f32]),
    F64(&'a [f64]),
    I32(&'a [i32]),
    U16(&'a [u16]),
    U8(&'a [u8]),
}

impl<'a> PixelData<'a> {
    pub fn len(&self) -> usize {
        match self {
            PixelData::F32(s) => s.len(),
            PixelData::F64(s) => s.len(),
            PixelData::I32(s) => s.len(),
            PixelData::U16(s) => s.len(),
            PixelData::U8(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype_name(&self) -> &'static str {
        match self {
            PixelData::F32(_) => "f32",
            PixelData::F64(_) => "f64",
            PixelData::I32(_) => "i32",
            PixelData::U16(_) => "u16",
            PixelData::U8(_) => "u8",
        }
    }

    /// Convert the range `[start, start + out.len())` into `out`.
    pub fn fill_f32(&self, start: usize, out: &mut [f32]) {
        match self {
            PixelData::F32(s) => out.copy_from_slice(&s[start..start + out.len()]),
            PixelData::F64(s) => convert_segment(&s[start..start + out.len()], out),
            PixelData::I32(s) => convert_segment(&s[start..start + out.len()], out),
            PixelData::U16(s) => convert_segment(&s[start..start + out.len()], out),
            PixelData::U8(s) => convert_segment(&s[start..start + out.len()], out),
        }
    }
}

fn convert_segment<T: Copy + AsPrimitive<f32>>(src: &[T], out: &mut [f32]) {
    for (o, &v) in out.iter_mut().zip(src) {
        *o = v.as_();
    }
}

/// Mutable row-major pixel data for in-place operations.
///
/// Only floating-point buffers can be written back without loss; integer
/// images must be converted by the caller first.
#[derive(Debug)]
pub enum PixelDataMut<'a> {
    F32(&'a mut [f32]),
    F64(&'a mut [f64]),
}

impl<'a> PixelDataMut<'a> {
    pub fn len(&self) -> usize {
        match self {
            PixelDataMut::F32(s) => s.len(),
            PixelDataMut::F64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How the elements of a noise companion buffer are to be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoiseKind {
    /// Elements are per-pixel variances.
    Variance,
    /// Elements are per-pixel standard deviations.
    Stddev,
}

/// Noise companion of an image: absent, a single RMS for the whole frame,
/// or a full per-pixel map.
#[derive(Clone, Copy, Debug)]
pub enum Noise<'a> {
    None,
    Const { rms: f32 },
    Map { data: PixelData<'a>, kind: NoiseKind },
}

impl<'a> Noise<'a> {
    pub fn is_none(&self) -> bool {
        matches!(self, Noise::None)
    }

    /// Fill `out` with per-pixel variances for the given range, if any
    /// noise information is present.
    pub fn fill_variance(&self, start: usize, out: &mut [f32]) -> bool {
        match self {
            Noise::None => false,
            Noise::Const { rms } => {
                out.fill(rms * rms);
                true
            }
            Noise::Map { data, kind } => {
                data.fill_f32(start, out);
                if *kind == NoiseKind::Stddev {
                    for v in out.iter_mut() {
                        *v *= *v;
                    }
                }
                true
            }
        }
    }
}

/// Immutable view of a 2-D image with optional noise and mask companions.
///
/// `data` is row-major with `width * height` elements. Companion buffers
/// share the same shape. Pixels whose mask value is `>= mask_thresh` are
/// ignored by every kernel.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    pub data: PixelData<'a>,
    pub width: usize,
    pub height: usize,
    pub noise: Noise<'a>,
    pub mask: Option<PixelData<'a>>,
    pub mask_thresh: f32,
}

impl<'a> ImageView<'a> {
    pub fn new(data: PixelData<'a>, width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(PleiadesError::InvalidDimensions { width, height });
        }
        if data.len() != width * height {
            return Err(PleiadesError::ShapeMismatch {
                name: "pixel",
                got: data.len(),
                expected: width * height,
            });
        }
        Ok(Self {
            data,
            width,
            height,
            noise: Noise::None,
            mask: None,
            mask_thresh: 0.0,
        })
    }

    /// Borrow a standard-layout `Array2<f32>` as an image view.
    pub fn from_array(data: &'a Array2<f32>) -> Result<Self> {
        let (h, w) = data.dim();
        let slice = data.as_slice().ok_or_else(|| {
            PleiadesError::IllegalArgument("image array must be contiguous row-major".into())
        })?;
        Self::new(PixelData::F32(slice), w, h)
    }

    pub fn with_noise(mut self, noise: Noise<'a>) -> Result<Self> {
        if let Noise::Map { data, .. } = &noise {
            if data.len() != self.width * self.height {
                return Err(PleiadesError::ShapeMismatch {
                    name: "noise",
                    got: data.len(),
                    expected: self.width * self.height,
                });
            }
        }
        self.noise = noise;
        Ok(self)
    }

    pub fn with_mask(mut self, mask: PixelData<'a>, mask_thresh: f32) -> Result<Self> {
        if mask.len() != self.width * self.height {
            return Err(PleiadesError::ShapeMismatch {
                name: "mask",
                got: mask.len(),
                expected: self.width * self.height,
            });
        }
        self.mask = Some(mask);
        self.mask_thresh = mask_thresh;
        Ok(self)
    }

    /// Convert image row `y` into `out` (`out.len() == width`).
    pub fn fill_row(&self, y: usize, out: &mut [f32]) {
        self.data.fill_f32(y * self.width, out);
    }

    /// Convert the segment `[x0, x1)` of row `y` into `out`.
    pub fn fill_row_segment(&self, y: usize, x0: usize, out: &mut [f32]) {
        self.data.fill_f32(y * self.width + x0, out);
    }

    /// Per-pixel variance for row `y`, if noise information is present.
    pub fn fill_variance_row(&self, y: usize, out: &mut [f32]) -> bool {
        self.noise.fill_variance(y * self.width, out)
    }

    /// Mask values for row `y`. Returns false (and leaves `out` untouched)
    /// when no mask is attached.
    pub fn fill_mask_row(&self, y: usize, out: &mut [f32]) -> bool {
        match &self.mask {
            Some(m) => {
                m.fill_f32(y * self.width, out);
                true
            }
            None => false,
        }
    }
}
