//! 2D FFT wrappers around rustfft.
//!
//! Scaling lives entirely on the inverse: `fft2` is unscaled and `ifft2`
//! divides by `nrows * ncols`. The shifts roll each axis by `n / 2` (forward)
//! or `n - n / 2` (inverse) so odd sizes round-trip.

use ndarray::Array2;
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Row FFTs then column FFTs on a row-major buffer. Columns are handled by
/// transposing into a scratch buffer so every transform runs on contiguous data.
fn transform_2d(
    data: &mut [Complex64],
    nrows: usize,
    ncols: usize,
    row_fft: Arc<dyn Fft<f64>>,
    col_fft: Arc<dyn Fft<f64>>,
) {
    // rustfft processes the buffer as consecutive chunks of the plan length
    row_fft.process(data);

    let mut transposed = vec![Complex64::new(0.0, 0.0); nrows * ncols];
    for i in 0..nrows {
        for j in 0..ncols {
            transposed[j * nrows + i] = data[i * ncols + j];
        }
    }
    col_fft.process(&mut transposed);
    for i in 0..nrows {
        for j in 0..ncols {
            data[i * ncols + j] = transposed[j * nrows + i];
        }
    }
}

/// Forward 2D FFT of a complex field, unscaled.
pub fn fft2_complex(input: &Array2<Complex64>) -> Array2<Complex64> {
    let (nrows, ncols) = input.dim();
    if nrows == 0 || ncols == 0 {
        return input.clone();
    }
    let mut planner = FftPlanner::new();
    let mut buf: Vec<Complex64> = input.iter().copied().collect();
    transform_2d(
        &mut buf,
        nrows,
        ncols,
        planner.plan_fft_forward(ncols),
        planner.plan_fft_forward(nrows),
    );
    Array2::from_shape_fn((nrows, ncols), |(i, j)| buf[i * ncols + j])
}

/// Forward 2D FFT of a real field.
pub fn fft2(input: &Array2<f64>) -> Array2<Complex64> {
    fft2_complex(&input.mapv(|v| Complex64::new(v, 0.0)))
}

/// Inverse 2D FFT keeping the complex result, scaled by `1 / (nrows * ncols)`.
pub fn ifft2_complex(input: &Array2<Complex64>) -> Array2<Complex64> {
    let (nrows, ncols) = input.dim();
    if nrows == 0 || ncols == 0 {
        return input.clone();
    }
    let mut planner = FftPlanner::new();
    let norm = 1.0 / (nrows * ncols) as f64;
    let mut buf: Vec<Complex64> = input.iter().copied().collect();
    transform_2d(
        &mut buf,
        nrows,
        ncols,
        planner.plan_fft_inverse(ncols),
        planner.plan_fft_inverse(nrows),
    );
    Array2::from_shape_fn((nrows, ncols), |(i, j)| buf[i * ncols + j] * norm)
}

/// Inverse 2D FFT, real part only.
pub fn ifft2(input: &Array2<Complex64>) -> Array2<f64> {
    ifft2_complex(input).mapv(|c| c.re)
}

fn roll<T: Copy>(input: &Array2<T>, shift_rows: usize, shift_cols: usize) -> Array2<T> {
    let (nrows, ncols) = input.dim();
    Array2::from_shape_fn((nrows, ncols), |(i, j)| {
        input[[(i + nrows - shift_rows) % nrows, (j + ncols - shift_cols) % ncols]]
    })
}

/// Move the zero-frequency (origin) element to the centre.
pub fn fftshift<T: Copy>(input: &Array2<T>) -> Array2<T> {
    let (nrows, ncols) = input.dim();
    if nrows == 0 || ncols == 0 {
        return input.clone();
    }
    roll(input, nrows / 2, ncols / 2)
}

/// Inverse of [`fftshift`]: the centre element moves to index 0. Differs from
/// `fftshift` for odd lengths.
pub fn ifftshift<T: Copy>(input: &Array2<T>) -> Array2<T> {
    let (nrows, ncols) = input.dim();
    if nrows == 0 || ncols == 0 {
        return input.clone();
    }
    roll(input, nrows - nrows / 2, ncols - ncols / 2)
}
