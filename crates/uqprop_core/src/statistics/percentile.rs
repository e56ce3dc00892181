//! Empirical moments and percentiles over sample columns.

/// Percentiles reported for every feature
pub mod standard {
    pub const P5: f64 = 0.05;
    pub const P95: f64 = 0.95;
}

/// Percentile `q` (in `[0, 1]`) of already sorted samples, interpolating
/// linearly between order statistics
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let position = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = position.floor() as usize;
            let upper = (lower + 1).min(n - 1);
            let frac = position - lower as f64;
            sorted[lower] + frac * (sorted[upper] - sorted[lower])
        }
    }
}

/// `(p5, p95)` of unsorted samples; sorts `samples` in place
pub fn percentile_pair(samples: &mut [f64]) -> (f64, f64) {
    samples.sort_by(f64::total_cmp);
    (
        percentile_sorted(samples, standard::P5),
        percentile_sorted(samples, standard::P95),
    )
}

pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return f64::NAN;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Population variance
pub fn variance(samples: &[f64]) -> f64 {
    let m = mean(samples);
    mean(&samples.iter().map(|x| (x - m).powi(2)).collect::<Vec<_>>())
}
