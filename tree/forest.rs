use crate::train::{grow, GrowOptions, GrowTarget};
use crate::Tree;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;

/// These are the options passed to `ForestClassifier::train` and `ForestRegressor::train`.
#[derive(Debug, Clone)]
pub struct ForestTrainOptions {
	/// The number of trees in the ensemble.
	pub n_trees: usize,
	/// The depth of a single tree will never exceed this value.
	pub max_depth: usize,
	/// A node will only be considered for splitting if it holds at least this many examples.
	pub min_examples_split: usize,
	/// A split is only valid if each resulting child holds at least this many examples.
	pub min_examples_leaf: usize,
	/// Each tree derives its rng from this seed and its index, so training is deterministic regardless of thread scheduling.
	pub seed: u64,
}

impl Default for ForestTrainOptions {
	fn default() -> Self {
		Self {
			n_trees: 200,
			max_depth: 15,
			min_examples_split: 5,
			min_examples_leaf: 2,
			seed: 42,
		}
	}
}

/// A bagging ensemble of classification trees. Each tree is grown on a bootstrap sample of the examples and considers sqrt(n_features) candidate features at each split. Predictions are vote fractions over the trees.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForestClassifier {
	pub trees: Vec<Tree>,
	pub n_classes: usize,
}

impl ForestClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: &[usize],
		n_classes: usize,
		options: &ForestTrainOptions,
	) -> Self {
		let n_split_features = features
			.ncols()
			.to_f32()
			.unwrap()
			.sqrt()
			.ceil()
			.to_usize()
			.unwrap();
		let trees = train_trees(
			features,
			&GrowTarget::Classification { labels, n_classes },
			Some(n_split_features),
			options,
		);
		Self { trees, n_classes }
	}

	/// Write the vote fraction each class received into `probabilities`, shape (n_examples, n_classes).
	pub fn predict(&self, features: ArrayView2<f32>, mut probabilities: ArrayViewMut2<f32>) {
		probabilities.fill(0.0);
		let n_trees = self.trees.len().to_f32().unwrap();
		for (example_index, example) in features.axis_iter(Axis(0)).enumerate() {
			for tree in self.trees.iter() {
				let class_index = tree.predict(example).to_usize().unwrap();
				probabilities[[example_index, class_index]] += 1.0;
			}
		}
		probabilities.map_inplace(|probability| *probability /= n_trees);
	}
}

/// A bagging ensemble of regression trees. Each tree is grown on a bootstrap sample with all features as split candidates. Predictions are the mean over the trees.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForestRegressor {
	pub trees: Vec<Tree>,
}

impl ForestRegressor {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<f32>,
		options: &ForestTrainOptions,
	) -> Self {
		let targets = labels.to_vec();
		let trees = train_trees(
			features,
			&GrowTarget::Regression { targets: &targets },
			None,
			options,
		);
		Self { trees }
	}

	/// Write predictions into `predictions` for the input `features`.
	pub fn predict(&self, features: ArrayView2<f32>, mut predictions: ArrayViewMut1<f32>) {
		let n_trees = self.trees.len().to_f32().unwrap();
		for (prediction, example) in predictions.iter_mut().zip(features.axis_iter(Axis(0))) {
			let sum: f32 = self.trees.iter().map(|tree| tree.predict(example)).sum();
			*prediction = sum / n_trees;
		}
	}
}

fn train_trees(
	features: ArrayView2<f32>,
	target: &GrowTarget,
	n_split_features: Option<usize>,
	options: &ForestTrainOptions,
) -> Vec<Tree> {
	let n_examples = features.nrows();
	let candidate_features: Vec<usize> = (0..features.ncols()).collect();
	let grow_options = GrowOptions {
		max_depth: options.max_depth,
		min_examples_split: options.min_examples_split,
		min_examples_leaf: options.min_examples_leaf,
		n_split_features,
	};
	(0..options.n_trees)
		.into_par_iter()
		.map(|tree_index| {
			let mut rng =
				Xoshiro256Plus::seed_from_u64(options.seed.wrapping_add(tree_index.to_u64().unwrap()));
			let examples: Vec<usize> = (0..n_examples)
				.map(|_| rng.gen_range(0, n_examples))
				.collect();
			grow(
				features,
				target,
				examples,
				&candidate_features,
				&grow_options,
				&mut rng,
			)
		})
		.collect()
}

#[cfg(test)]
mod test {
	use super::*;

	fn test_options() -> ForestTrainOptions {
		ForestTrainOptions {
			n_trees: 25,
			max_depth: 4,
			min_examples_split: 2,
			min_examples_leaf: 1,
			seed: 42,
		}
	}

	fn separable_features() -> Array2<f32> {
		let mut features = Array2::zeros((40, 2));
		for i in 0..40 {
			features[[i, 0]] = i.to_f32().unwrap() / 40.0;
			features[[i, 1]] = ((i * 7) % 13).to_f32().unwrap();
		}
		features
	}

	#[test]
	fn test_forest_classifier_separable() {
		let features = separable_features();
		let labels: Vec<usize> = (0..40).map(|i| if i < 20 { 0 } else { 1 }).collect();
		let model = ForestClassifier::train(features.view(), &labels, 2, &test_options());
		let mut probabilities = Array2::zeros((40, 2));
		model.predict(features.view(), probabilities.view_mut());
		let mut n_correct = 0;
		for (example_index, label) in labels.iter().enumerate() {
			let predicted = if probabilities[[example_index, 0]] >= probabilities[[example_index, 1]]
			{
				0
			} else {
				1
			};
			if predicted == *label {
				n_correct += 1;
			}
		}
		assert!(n_correct >= 38);
	}

	#[test]
	fn test_forest_regressor_step() {
		let features = separable_features();
		let labels: Array1<f32> =
			(0..40).map(|i| if i < 20 { 1.0 } else { 5.0 }).collect();
		let model = ForestRegressor::train(features.view(), labels.view(), &test_options());
		let mut predictions = Array1::zeros(40);
		model.predict(features.view(), predictions.view_mut());
		for (prediction, label) in predictions.iter().zip(labels.iter()) {
			assert!((prediction - label).abs() < 1.5);
		}
	}

	#[test]
	fn test_forest_train_is_deterministic() {
		let features = separable_features();
		let labels: Vec<usize> = (0..40).map(|i| if i < 20 { 0 } else { 1 }).collect();
		let model_a = ForestClassifier::train(features.view(), &labels, 2, &test_options());
		let model_b = ForestClassifier::train(features.view(), &labels, 2, &test_options());
		assert_eq!(model_a, model_b);
	}
}
