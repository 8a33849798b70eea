/*!
This crate implements the fitted preprocessors that sit between cleaned measurements and the models: a median imputer for missing values, a standard scaler, and a label encoder. Each one carries exactly the state it needs to be persisted and reloaded, so the serialized form is self describing and portable.

Every preprocessor is fit once on training data and then applied read-only. `transform` never updates fitted state, so transforming test data cannot leak information back into the fit.
*/

use ndarray::prelude::*;
use thiserror::Error;
use waterline_metrics::MeanVariance;

/// A `MedianImputer` replaces missing values in each feature column with the median of that column's non-missing training values.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MedianImputer {
	pub medians: Vec<f32>,
}

#[derive(Debug, Error)]
#[error("feature column {column_index} has no non-missing values to fit a median on")]
pub struct FitImputerError {
	pub column_index: usize,
}

impl MedianImputer {
	pub fn fit(features: ArrayView2<f32>) -> Result<Self, FitImputerError> {
		let medians = features
			.axis_iter(Axis(1))
			.enumerate()
			.map(|(column_index, column)| {
				median(column).ok_or(FitImputerError { column_index })
			})
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self { medians })
	}

	pub fn transform(&self, mut features: ArrayViewMut2<f32>) {
		for (mut column, median) in features.axis_iter_mut(Axis(1)).zip(self.medians.iter()) {
			for value in column.iter_mut() {
				if !value.is_finite() {
					*value = *median;
				}
			}
		}
	}

	pub fn n_features(&self) -> usize {
		self.medians.len()
	}
}

/// The median of the finite values, averaging the two middle values for even counts.
fn median(values: ArrayView1<f32>) -> Option<f32> {
	let mut values: Vec<f32> = values.iter().cloned().filter(|v| v.is_finite()).collect();
	if values.is_empty() {
		return None;
	}
	values.sort_by(|a, b| a.partial_cmp(b).unwrap());
	let middle = values.len() / 2;
	if values.len() % 2 == 1 {
		Some(values[middle])
	} else {
		Some((values[middle - 1] + values[middle]) / 2.0)
	}
}

/// A `StandardScaler` transforms each feature column to zero mean and unit variance. Features with zero variance are mapped to zero.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StandardScaler {
	pub means: Vec<f32>,
	pub variances: Vec<f32>,
}

impl StandardScaler {
	pub fn fit(features: ArrayView2<f32>) -> Self {
		let mut means = Vec::with_capacity(features.ncols());
		let mut variances = Vec::with_capacity(features.ncols());
		for column in features.axis_iter(Axis(1)) {
			let column = column.to_vec();
			let mean_variance = MeanVariance::compute(&column);
			means.push(mean_variance.mean);
			variances.push(mean_variance.variance);
		}
		Self { means, variances }
	}

	pub fn transform(&self, mut features: ArrayViewMut2<f32>) {
		for ((mut column, mean), variance) in features
			.axis_iter_mut(Axis(1))
			.zip(self.means.iter())
			.zip(self.variances.iter())
		{
			for value in column.iter_mut() {
				*value = if !value.is_finite() || *variance == 0.0 {
					0.0
				} else {
					(*value - mean) / f32::sqrt(*variance)
				};
			}
		}
	}

	pub fn n_features(&self) -> usize {
		self.means.len()
	}
}

/// A `LabelEncoder` maps the distinct class labels observed in training to dense codes in `[0, n_classes)`, in lexicographic label order, with an invertible mapping.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LabelEncoder {
	pub classes: Vec<String>,
}

impl LabelEncoder {
	pub fn fit(labels: &[String]) -> Self {
		let mut classes: Vec<String> = labels.to_vec();
		classes.sort();
		classes.dedup();
		Self { classes }
	}

	pub fn encode(&self, label: &str) -> Option<usize> {
		self.classes
			.binary_search_by(|class| class.as_str().cmp(label))
			.ok()
	}

	pub fn decode(&self, code: usize) -> Option<&str> {
		self.classes.get(code).map(|class| class.as_str())
	}

	pub fn n_classes(&self) -> usize {
		self.classes.len()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_median_imputer() {
		let features = arr2(&[
			[1.0, f32::NAN],
			[3.0, 4.0],
			[f32::NAN, 8.0],
			[2.0, 6.0],
		]);
		let imputer = MedianImputer::fit(features.view()).unwrap();
		assert_eq!(imputer.medians, vec![2.0, 6.0]);
		let mut transformed = features.clone();
		imputer.transform(transformed.view_mut());
		assert_eq!(transformed[[0, 1]], 6.0);
		assert_eq!(transformed[[2, 0]], 2.0);
		assert_eq!(transformed[[1, 0]], 3.0);
	}

	#[test]
	fn test_median_imputer_even_count() {
		let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
		let imputer = MedianImputer::fit(features.view()).unwrap();
		assert_eq!(imputer.medians, vec![2.5]);
	}

	#[test]
	fn test_median_imputer_all_missing_column() {
		let features = arr2(&[[1.0, f32::NAN], [2.0, f32::NAN]]);
		let error = MedianImputer::fit(features.view()).unwrap_err();
		assert_eq!(error.column_index, 1);
	}

	#[test]
	fn test_imputer_state_unchanged_by_transform() {
		let train = arr2(&[[1.0, 2.0], [3.0, f32::NAN], [5.0, 6.0]]);
		let imputer = MedianImputer::fit(train.view()).unwrap();
		let fitted = imputer.clone();
		let mut test = arr2(&[[f32::NAN, 100.0], [200.0, f32::NAN]]);
		imputer.transform(test.view_mut());
		assert_eq!(imputer, fitted);
		assert_eq!(test[[0, 0]], 3.0);
		assert_eq!(test[[1, 1]], 4.0);
	}

	#[test]
	fn test_standard_scaler() {
		let features = arr2(&[[0.0, 1.0], [2.0, 1.0], [4.0, 1.0]]);
		let scaler = StandardScaler::fit(features.view());
		assert_eq!(scaler.means[0], 2.0);
		assert_eq!(scaler.variances[1], 0.0);
		let mut transformed = features.clone();
		scaler.transform(transformed.view_mut());
		assert!((transformed[[0, 0]] + 1.224_744_9).abs() < 1e-5);
		assert_eq!(transformed[[1, 0]], 0.0);
		// Zero variance features map to zero rather than dividing by zero.
		assert_eq!(transformed[[0, 1]], 0.0);
	}

	#[test]
	fn test_label_encoder() {
		let labels = vec![
			"Polluted".to_owned(),
			"Safe/Potable".to_owned(),
			"Highly Polluted".to_owned(),
			"Polluted".to_owned(),
		];
		let encoder = LabelEncoder::fit(&labels);
		assert_eq!(
			encoder.classes,
			vec!["Highly Polluted", "Polluted", "Safe/Potable"]
		);
		assert_eq!(encoder.encode("Polluted"), Some(1));
		assert_eq!(encoder.decode(2), Some("Safe/Potable"));
		assert_eq!(encoder.encode("Pristine"), None);
		assert_eq!(encoder.n_classes(), 3);
	}
}
