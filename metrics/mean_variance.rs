//! https://en.wikipedia.org/wiki/Algorithms_for_calculating_variance#Parallel_algorithm

use num_traits::ToPrimitive;

/// The mean and population variance of a set of values, computed in one pass. Non-finite values are skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanVariance {
	pub n: u64,
	pub mean: f32,
	pub variance: f32,
}

impl MeanVariance {
	pub fn compute(values: &[f32]) -> Self {
		let mut n: u64 = 0;
		let mut mean = 0.0f64;
		let mut m2 = 0.0f64;
		for value in values {
			if !value.is_finite() {
				continue;
			}
			let value = value.to_f64().unwrap();
			n += 1;
			let delta = value - mean;
			mean += delta / n.to_f64().unwrap();
			m2 += delta * (value - mean);
		}
		Self {
			n,
			mean: mean as f32,
			variance: if n == 0 { f32::NAN } else { m2_to_variance(m2, n) },
		}
	}
}

/// Combine two separate means and m2 values into a single mean and m2, useful in parallel algorithms.
pub fn merge_mean_m2(
	n_a: u64,
	mean_a: f64,
	m2_a: f64,
	n_b: u64,
	mean_b: f64,
	m2_b: f64,
) -> (f64, f64) {
	let n_a = n_a.to_f64().unwrap();
	let n_b = n_b.to_f64().unwrap();
	(
		(((n_a * mean_a) + (n_b * mean_b)) / (n_a + n_b)),
		m2_a + m2_b + (mean_b - mean_a) * (mean_b - mean_a) * (n_a * n_b / (n_a + n_b)),
	)
}

pub fn m2_to_variance(m2: f64, n: u64) -> f32 {
	(m2 / n.to_f64().unwrap()) as f32
}

#[test]
fn test_mean_variance() {
	let mv = MeanVariance::compute(&[0.0, 5.2, 1.3, 10.0]);
	assert_eq!(mv.n, 4);
	assert!((mv.mean - 4.125).abs() < 1e-6);
	assert!((mv.variance - 15.166875).abs() < 1e-3);
}

#[test]
fn test_mean_variance_skips_nan() {
	let mv = MeanVariance::compute(&[1.0, f32::NAN, 3.0]);
	assert_eq!(mv.n, 2);
	assert!((mv.mean - 2.0).abs() < 1e-6);
	assert!((mv.variance - 1.0).abs() < 1e-6);
}
