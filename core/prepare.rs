/*!
This module turns a cleaned dataframe into the numeric training data: the ordered feature name list, the raw feature matrix, the encoded class labels, and the water quality index targets. It also provides the train/test splits.
*/

use crate::clean::PARAMETER_COLUMNS;
use crate::wqi::{classify, wqi, Standards};
use anyhow::{format_err, Result};
use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256Plus;
use waterline_dataframe::{DataFrame, NumberColumn};
use waterline_features::LabelEncoder;

#[derive(Debug)]
pub struct PreparedData {
	/// The parameter columns used as features, in canonical order. Persisted with the models so inference projects inputs the same way.
	pub feature_names: Vec<String>,
	/// The raw feature matrix, one row per labeled sample, with NaN for missing values.
	pub features: Array2<f32>,
	/// The encoded class label for each sample.
	pub labels: Vec<usize>,
	/// The water quality index for each sample.
	pub wqi: Array1<f32>,
	pub label_encoder: LabelEncoder,
}

/// Score every sample, label it, and drop samples whose index is undefined because none of their parameters are scorable.
pub fn prepare(dataframe: &DataFrame, standards: &Standards) -> Result<PreparedData> {
	let feature_names: Vec<String> = PARAMETER_COLUMNS
		.iter()
		.filter(|column_name| dataframe.column(column_name).is_some())
		.map(|column_name| (*column_name).to_owned())
		.collect();
	let columns: Vec<&NumberColumn> = feature_names
		.iter()
		.map(|column_name| {
			dataframe
				.column(column_name)
				.and_then(|column| column.as_number())
				.ok_or_else(|| {
					format_err!("column \"{}\" is not a number column", column_name)
				})
		})
		.collect::<Result<Vec<_>>>()?;
	let mut row_indices = Vec::new();
	let mut wqis = Vec::new();
	let mut class_labels = Vec::new();
	for row_index in 0..dataframe.nrows() {
		let values = izip!(feature_names.iter(), columns.iter())
			.map(|(column_name, column)| (column_name.as_str(), column.data[row_index]));
		let wqi = wqi(values, standards);
		if let (Some(wqi), Some(class)) = (wqi, classify(wqi)) {
			row_indices.push(row_index);
			wqis.push(wqi);
			class_labels.push(class.as_str().to_owned());
		}
	}
	if row_indices.is_empty() {
		return Err(format_err!(
			"no sample has a computable water quality index"
		));
	}
	let mut features = Array2::zeros((row_indices.len(), columns.len()));
	for (output_index, row_index) in row_indices.iter().enumerate() {
		for (column_index, column) in columns.iter().enumerate() {
			features[[output_index, column_index]] = column.data[*row_index];
		}
	}
	let label_encoder = LabelEncoder::fit(&class_labels);
	let labels = class_labels
		.iter()
		.map(|label| label_encoder.encode(label).unwrap())
		.collect();
	Ok(PreparedData {
		feature_names,
		features,
		labels,
		wqi: Array1::from(wqis),
		label_encoder,
	})
}

/// An unstratified shuffled split. Returns (train_indices, test_indices).
pub fn train_test_split(
	n_examples: usize,
	test_fraction: f32,
	rng: &mut Xoshiro256Plus,
) -> (Vec<usize>, Vec<usize>) {
	let mut indices: Vec<usize> = (0..n_examples).collect();
	indices.shuffle(rng);
	let split_index = ((1.0 - test_fraction) * n_examples.to_f32().unwrap())
		.to_usize()
		.unwrap();
	let test_indices = indices.split_off(split_index);
	(indices, test_indices)
}

/// A shuffled split that preserves the class proportions of `labels` in both sides. Returns (train_indices, test_indices).
pub fn stratified_train_test_split(
	labels: &[usize],
	test_fraction: f32,
	rng: &mut Xoshiro256Plus,
) -> (Vec<usize>, Vec<usize>) {
	let n_classes = labels.iter().max().map(|max| max + 1).unwrap_or(0);
	let mut indices_by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
	for (index, label) in labels.iter().enumerate() {
		indices_by_class[*label].push(index);
	}
	let mut train_indices = Vec::new();
	let mut test_indices = Vec::new();
	for mut indices in indices_by_class {
		indices.shuffle(rng);
		let split_index = ((1.0 - test_fraction) * indices.len().to_f32().unwrap())
			.to_usize()
			.unwrap();
		test_indices.extend(indices.split_off(split_index));
		train_indices.extend(indices);
	}
	train_indices.shuffle(rng);
	test_indices.shuffle(rng);
	(train_indices, test_indices)
}

/// Gather the given rows of a feature matrix into a new matrix.
pub fn take_rows(features: &Array2<f32>, indices: &[usize]) -> Array2<f32> {
	features.select(Axis(0), indices)
}

#[cfg(test)]
mod test {
	use super::*;
	use rand::SeedableRng;
	use waterline_dataframe::{Column, TextColumn};

	fn test_dataframe() -> DataFrame {
		// Three samples: a clean one, a polluted one, and one with no scorable parameters.
		DataFrame {
			columns: vec![
				Column::Text(TextColumn {
					name: "Station name".to_owned(),
					data: vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
				}),
				Column::Number(NumberColumn {
					name: "pH".to_owned(),
					data: vec![7.0, 9.9, f32::NAN],
				}),
				Column::Number(NumberColumn {
					name: "BOD (mg/L)".to_owned(),
					data: vec![1.0, 60.0, f32::NAN],
				}),
				Column::Number(NumberColumn {
					name: "TSS (mg/L)".to_owned(),
					data: vec![8.0, 8.0, 8.0],
				}),
			],
		}
	}

	#[test]
	fn test_prepare_drops_unscorable_rows() {
		let standards = Standards::reference();
		let prepared = prepare(&test_dataframe(), &standards).unwrap();
		// The third sample only has TSS, which has no standard, so it is dropped.
		assert_eq!(prepared.features.nrows(), 2);
		assert_eq!(
			prepared.feature_names,
			vec!["pH".to_owned(), "BOD (mg/L)".to_owned(), "TSS (mg/L)".to_owned()]
		);
		assert_eq!(prepared.wqi.len(), 2);
		assert!(prepared.wqi[0] > prepared.wqi[1]);
		assert_eq!(prepared.labels.len(), 2);
	}

	#[test]
	fn test_prepare_feature_names_follow_canonical_order() {
		let standards = Standards::reference();
		let prepared = prepare(&test_dataframe(), &standards).unwrap();
		// "pH" precedes "BOD (mg/L)" in the canonical parameter order even though the
		// dataframe could list them differently.
		assert_eq!(prepared.feature_names[0], "pH");
	}

	#[test]
	fn test_train_test_split_sizes() {
		let mut rng = Xoshiro256Plus::seed_from_u64(42);
		let (train, test) = train_test_split(100, 0.2, &mut rng);
		assert_eq!(train.len(), 80);
		assert_eq!(test.len(), 20);
		let mut all: Vec<usize> = train.iter().chain(test.iter()).cloned().collect();
		all.sort_unstable();
		assert_eq!(all, (0..100).collect::<Vec<usize>>());
	}

	#[test]
	fn test_split_is_deterministic() {
		let mut rng_a = Xoshiro256Plus::seed_from_u64(42);
		let mut rng_b = Xoshiro256Plus::seed_from_u64(42);
		assert_eq!(
			train_test_split(50, 0.2, &mut rng_a),
			train_test_split(50, 0.2, &mut rng_b)
		);
	}

	#[test]
	fn test_stratified_split_preserves_proportions() {
		let mut labels = Vec::new();
		labels.extend(std::iter::repeat(0).take(60));
		labels.extend(std::iter::repeat(1).take(30));
		labels.extend(std::iter::repeat(2).take(10));
		let mut rng = Xoshiro256Plus::seed_from_u64(42);
		let (train, test) = stratified_train_test_split(&labels, 0.2, &mut rng);
		assert_eq!(train.len(), 80);
		assert_eq!(test.len(), 20);
		for (class, expected_test_count) in &[(0usize, 12usize), (1, 6), (2, 2)] {
			let count = test.iter().filter(|index| labels[**index] == *class).count();
			assert_eq!(count, *expected_test_count);
		}
	}
}
