//! Order statistics for sample screening.

/// Percentile `q` in [0, 100] with linear interpolation between closest
/// ranks: position `q / 100 * (n - 1)` in the sorted data. `None` for empty input.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q = q.clamp(0.0, 100.0);
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Tukey fences `[Q1 - k·IQR, Q3 + k·IQR]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrFences {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrFences {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }
}

pub fn iqr_fences(values: &[f64], k: f64) -> Option<IqrFences> {
    let q1 = percentile(values, 25.0)?;
    let q3 = percentile(values, 75.0)?;
    let iqr = q3 - q1;
    Some(IqrFences {
        q1,
        q3,
        lower: q1 - k * iqr,
        upper: q3 + k * iqr,
    })
}

/// Indices of values outside the Tukey fences. Fewer than four values are
/// never screened.
pub fn iqr_outlier_indices(values: &[f64], k: f64) -> Vec<usize> {
    if values.len() < 4 {
        return Vec::new();
    }
    match iqr_fences(values, k) {
        Some(f) => values
            .iter()
            .enumerate()
            .filter(|(_, &v)| !f.contains(v))
            .map(|(i, _)| i)
            .collect(),
        None => Vec::new(),
    }
}

/// Index of the smallest value (first one on ties).
pub fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
