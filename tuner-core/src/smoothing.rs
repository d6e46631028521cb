//! Curve helpers shared by the fallback and post-processing passes.

/// Kernel radius in standard deviations.
const KERNEL_TRUNCATE: f64 = 4.0;

/// Piecewise-linear interpolation of `(xs, ys)` at every point of `at`.
///
/// `xs` must be ascending. Points left of the first control point take its
/// value, points right of the last take the last value.
pub fn interp(at: &[f64], xs: &[f64], ys: &[f64]) -> Vec<f64> {
    debug_assert_eq!(xs.len(), ys.len());
    at.iter()
        .map(|&x| {
            if xs.is_empty() {
                return 0.0;
            }
            let last = xs.len() - 1;
            if x <= xs[0] {
                return ys[0];
            }
            if x >= xs[last] {
                return ys[last];
            }
            // First control point strictly right of x.
            let hi = xs.partition_point(|&p| p <= x);
            let lo = hi - 1;
            let t = (x - xs[lo]) / (xs[hi] - xs[lo]);
            ys[lo] + t * (ys[hi] - ys[lo])
        })
        .collect()
}

/// Maps an out-of-range index back into `0..n` by mirroring about the edges
/// (`d c b a | a b c d | d c b a`).
fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - m - 1) as usize
    }
}

/// Normalized Gaussian kernel of standard deviation `sigma`.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (KERNEL_TRUNCATE * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// One-dimensional Gaussian smoothing with mirrored boundaries.
///
/// A non-positive `sigma` returns the input unchanged.
pub fn gaussian_filter1d(values: &[f64], sigma: f64) -> Vec<f64> {
    if values.is_empty() || !(sigma > 0.0) {
        return values.to_vec();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let n = values.len();
    (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * values[reflect_index(i + k as isize - radius, n)])
                .sum()
        })
        .collect()
}
