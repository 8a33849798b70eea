use super::{mean_variance::merge_mean_m2, StreamingMetric};
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// `RegressionMetrics` computes the mean squared error, the root mean squared error, and the coefficient of determination R² of a set of predictions.
#[derive(Debug, Default)]
pub struct RegressionMetrics {
	mean_variance: Option<LabelMeanVariance>,
	squared_error: f64,
}

#[derive(Debug)]
struct LabelMeanVariance {
	n: u64,
	mean: f64,
	m2: f64,
}

pub struct RegressionMetricsInput<'a> {
	pub predictions: ArrayView1<'a, f32>,
	pub labels: ArrayView1<'a, f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionMetricsOutput {
	pub mse: f32,
	pub rmse: f32,
	pub r2: f32,
}

impl RegressionMetrics {
	pub fn new() -> Self {
		Self::default()
	}
}

impl<'a> StreamingMetric<'a> for RegressionMetrics {
	type Input = RegressionMetricsInput<'a>;
	type Output = RegressionMetricsOutput;

	fn update(&mut self, input: RegressionMetricsInput) {
		let RegressionMetricsInput {
			predictions,
			labels,
		} = input;
		for (prediction, label) in predictions.iter().zip(labels.iter()) {
			match &mut self.mean_variance {
				Some(mean_variance) => {
					let (mean, m2) = merge_mean_m2(
						mean_variance.n,
						mean_variance.mean,
						mean_variance.m2,
						1,
						label.to_f64().unwrap(),
						0.0,
					);
					mean_variance.n += 1;
					mean_variance.mean = mean;
					mean_variance.m2 = m2;
				}
				None => {
					self.mean_variance = Some(LabelMeanVariance {
						n: 1,
						mean: label.to_f64().unwrap(),
						m2: 0.0,
					})
				}
			}
			let error = (prediction - label).to_f64().unwrap();
			self.squared_error += error * error;
		}
	}

	fn merge(&mut self, other: Self) {
		match &mut self.mean_variance {
			Some(mean_variance) => {
				if let Some(other) = other.mean_variance {
					let (mean, m2) = merge_mean_m2(
						mean_variance.n,
						mean_variance.mean,
						mean_variance.m2,
						other.n,
						other.mean,
						other.m2,
					);
					mean_variance.mean = mean;
					mean_variance.m2 = m2;
					mean_variance.n += other.n;
				}
			}
			None => {
				self.mean_variance = other.mean_variance;
			}
		}
		self.squared_error += other.squared_error;
	}

	fn finalize(self) -> Self::Output {
		let (n, variance) = match self.mean_variance {
			Some(m) => (m.n.to_f64().unwrap(), m.m2 / m.n.to_f64().unwrap()),
			None => (0.0, f64::NAN),
		};
		let mse = self.squared_error / n;
		let rmse = mse.sqrt();
		let r2 = 1.0 - self.squared_error / (variance * n);
		RegressionMetricsOutput {
			mse: mse as f32,
			rmse: rmse as f32,
			r2: r2 as f32,
		}
	}
}

#[test]
fn test_regression_metrics() {
	let mut metrics = RegressionMetrics::new();
	let predictions = arr1(&[2.5, 0.0, 2.0, 8.0]);
	let labels = arr1(&[3.0, -0.5, 2.0, 7.0]);
	metrics.update(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: labels.view(),
	});
	let output = metrics.finalize();
	assert!((output.mse - 0.375).abs() < 1e-6);
	assert!((output.rmse - 0.612_372_4).abs() < 1e-6);
	assert!((output.r2 - 0.948_608_1).abs() < 1e-4);
}

#[test]
fn test_regression_metrics_perfect_fit() {
	let mut metrics = RegressionMetrics::new();
	let values = arr1(&[1.0, 2.0, 3.0]);
	metrics.update(RegressionMetricsInput {
		predictions: values.view(),
		labels: values.view(),
	});
	let output = metrics.finalize();
	assert_eq!(output.mse, 0.0);
	assert_eq!(output.r2, 1.0);
}
