//! Spatial filters on 2D fields.
//!
//! `gaussian_filter` mirrors about the half-sample boundary (`d c b a | a b c d`);
//! `convolve_same` pads with zeros.

use ndarray::Array2;

/// Kernel extent in standard deviations.
const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// Map an out-of-range index into [0, n) by half-sample reflection
/// (`d c b a | a b c d | d c b a`).
fn reflect_index(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let mut k = i.rem_euclid(period);
    if k >= n {
        k = period - 1 - k;
    }
    k as usize
}

/// Normalized 1D Gaussian weights of radius `int(truncate * sigma + 0.5)`.
pub fn gaussian_kernel_1d(sigma: f64) -> Vec<f64> {
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as usize;
    let two_s2 = 2.0 * sigma * sigma;
    let mut w: Vec<f64> = (0..=2 * radius)
        .map(|k| {
            let x = k as f64 - radius as f64;
            (-x * x / two_s2).exp()
        })
        .collect();
    let sum: f64 = w.iter().sum();
    for v in w.iter_mut() {
        *v /= sum;
    }
    w
}

/// Separable Gaussian blur with reflect boundaries. `sigma <= 0` returns a copy.
pub fn gaussian_filter(field: &Array2<f64>, sigma: f64) -> Array2<f64> {
    if sigma.is_nan() || sigma <= 0.0 || field.is_empty() {
        return field.clone();
    }
    let (nrows, ncols) = field.dim();
    let w = gaussian_kernel_1d(sigma);
    let radius = (w.len() / 2) as isize;

    // Axis 0
    let mut tmp = Array2::zeros((nrows, ncols));
    for i in 0..nrows {
        for j in 0..ncols {
            let mut acc = 0.0;
            for (k, &wk) in w.iter().enumerate() {
                let src = reflect_index(i as isize + k as isize - radius, nrows);
                acc += wk * field[[src, j]];
            }
            tmp[[i, j]] = acc;
        }
    }

    // Axis 1
    let mut out = Array2::zeros((nrows, ncols));
    for i in 0..nrows {
        for j in 0..ncols {
            let mut acc = 0.0;
            for (k, &wk) in w.iter().enumerate() {
                let src = reflect_index(j as isize + k as isize - radius, ncols);
                acc += wk * tmp[[i, src]];
            }
            out[[i, j]] = acc;
        }
    }
    out
}

/// Reverse both axes of a kernel.
pub fn flip_both<T: Copy>(kernel: &Array2<T>) -> Array2<T> {
    let (kr, kc) = kernel.dim();
    Array2::from_shape_fn((kr, kc), |(i, j)| kernel[[kr - 1 - i, kc - 1 - j]])
}

/// Direct 2D convolution, same-size output, zero padding.
///
/// `out[i, j] = Σ k[m, n] · in[i - m + kr/2, j - n + kc/2]` for odd and even
/// kernel sizes alike.
pub fn convolve_same(input: &Array2<f64>, kernel: &Array2<f64>) -> Array2<f64> {
    let (nr, nc) = input.dim();
    let (kr, kc) = kernel.dim();
    let mut out = Array2::zeros((nr, nc));
    if kr == 0 || kc == 0 {
        return out;
    }
    let cr = (kr / 2) as isize;
    let cc = (kc / 2) as isize;

    for m in 0..kr {
        for n in 0..kc {
            let w = kernel[[m, n]];
            if w == 0.0 {
                continue;
            }
            // Input row = i - m + cr; keep it inside [0, nr)
            let dr = cr - m as isize;
            let dc = cc - n as isize;
            let i_lo = (-dr).max(0) as usize;
            let i_hi = (nr as isize - dr).min(nr as isize);
            let j_lo = (-dc).max(0) as usize;
            let j_hi = (nc as isize - dc).min(nc as isize);
            if i_hi <= i_lo as isize || j_hi <= j_lo as isize {
                continue;
            }
            for i in i_lo..i_hi as usize {
                let si = (i as isize + dr) as usize;
                for j in j_lo..j_hi as usize {
                    let sj = (j as isize + dc) as usize;
                    out[[i, j]] += w * input[[si, sj]];
                }
            }
        }
    }
    out
}
