use crate::train::{grow, GrowOptions, GrowTarget};
use crate::{LeafNode, Node, Tree};
use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// These are the options passed to `BoostedClassifier::train` and `BoostedRegressor::train`.
#[derive(Debug, Clone)]
pub struct BoostedTrainOptions {
	/// This is the maximum number of rounds of boosting.
	pub n_rounds: usize,
	/// The depth of a single tree will never exceed this value.
	pub max_depth: usize,
	/// The learning rate scales the leaf values to control the effect each tree has on the output.
	pub learning_rate: f32,
	/// The fraction of examples sampled without replacement for each tree.
	pub row_subsample: f32,
	/// The fraction of features available to each tree as split candidates.
	pub feature_subsample: f32,
	/// A node will only be considered for splitting if it holds at least this many examples.
	pub min_examples_split: usize,
	/// A split is only valid if each resulting child holds at least this many examples.
	pub min_examples_leaf: usize,
	pub seed: u64,
}

impl Default for BoostedTrainOptions {
	fn default() -> Self {
		Self {
			n_rounds: 200,
			max_depth: 8,
			learning_rate: 0.1,
			row_subsample: 0.8,
			feature_subsample: 0.8,
			min_examples_split: 2,
			min_examples_leaf: 1,
			seed: 42,
		}
	}
}

/// This struct represents a gradient boosted regressor. The bias is the mean of the training labels and each round fits one tree to the remaining residuals.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoostedRegressor {
	pub bias: f32,
	pub trees: Vec<Tree>,
}

impl BoostedRegressor {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<f32>,
		options: &BoostedTrainOptions,
	) -> Self {
		let n_examples = features.nrows();
		let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
		let grow_options = grow_options(options);
		let bias = labels.mean().unwrap();
		let mut predictions = vec![bias; n_examples];
		let mut residuals = vec![0.0f32; n_examples];
		let mut trees = Vec::with_capacity(options.n_rounds);
		for _ in 0..options.n_rounds {
			for (residual, label, prediction) in
				izip!(residuals.iter_mut(), labels.iter(), predictions.iter())
			{
				*residual = label - prediction;
			}
			let examples = sample_examples(n_examples, options.row_subsample, &mut rng);
			let candidate_features =
				sample_features(features.ncols(), options.feature_subsample, &mut rng);
			let mut tree = grow(
				features,
				&GrowTarget::Regression {
					targets: &residuals,
				},
				examples,
				&candidate_features,
				&grow_options,
				&mut rng,
			);
			scale_leaf_values(&mut tree, options.learning_rate);
			for (prediction, example) in
				predictions.iter_mut().zip(features.axis_iter(Axis(0)))
			{
				*prediction += tree.predict(example);
			}
			trees.push(tree);
		}
		Self { bias, trees }
	}

	/// Write predictions into `predictions` for the input `features`.
	pub fn predict(&self, features: ArrayView2<f32>, mut predictions: ArrayViewMut1<f32>) {
		predictions.fill(self.bias);
		for (prediction, example) in predictions.iter_mut().zip(features.axis_iter(Axis(0))) {
			for tree in self.trees.iter() {
				*prediction += tree.predict(example);
			}
		}
	}
}

/// This struct represents a gradient boosted multiclass classifier. The biases are the log class priors, and each round fits one tree per class to the softmax gradients. The trees have shape (n_rounds, n_classes) flattened in round-major order.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoostedClassifier {
	pub biases: Vec<f32>,
	pub trees: Vec<Tree>,
	pub n_classes: usize,
	pub n_rounds: usize,
}

impl BoostedClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: &[usize],
		n_classes: usize,
		options: &BoostedTrainOptions,
	) -> Self {
		let n_examples = features.nrows();
		let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
		let grow_options = grow_options(options);
		let biases = compute_biases(labels, n_classes, n_examples);
		let mut logits = Array2::zeros((n_examples, n_classes));
		for mut row in logits.axis_iter_mut(Axis(0)) {
			for (logit, bias) in row.iter_mut().zip(biases.iter()) {
				*logit = *bias;
			}
		}
		let mut residuals = vec![0.0f32; n_examples];
		let mut trees = Vec::with_capacity(options.n_rounds * n_classes);
		for _ in 0..options.n_rounds {
			let mut probabilities = logits.clone();
			for mut row in probabilities.axis_iter_mut(Axis(0)) {
				softmax(row.view_mut());
			}
			for class_index in 0..n_classes {
				for (example_index, (residual, label)) in
					residuals.iter_mut().zip(labels.iter()).enumerate()
				{
					let indicator = if *label == class_index { 1.0 } else { 0.0 };
					*residual = indicator - probabilities[[example_index, class_index]];
				}
				let examples = sample_examples(n_examples, options.row_subsample, &mut rng);
				let candidate_features =
					sample_features(features.ncols(), options.feature_subsample, &mut rng);
				let mut tree = grow(
					features,
					&GrowTarget::Regression {
						targets: &residuals,
					},
					examples,
					&candidate_features,
					&grow_options,
					&mut rng,
				);
				scale_leaf_values(&mut tree, options.learning_rate);
				for (mut logit_row, example) in logits
					.axis_iter_mut(Axis(0))
					.zip(features.axis_iter(Axis(0)))
				{
					logit_row[class_index] += tree.predict(example);
				}
				trees.push(tree);
			}
		}
		Self {
			biases,
			trees,
			n_classes,
			n_rounds: options.n_rounds,
		}
	}

	/// Write class probabilities into `probabilities`, shape (n_examples, n_classes).
	pub fn predict(&self, features: ArrayView2<f32>, mut probabilities: ArrayViewMut2<f32>) {
		let trees =
			ArrayView2::from_shape((self.n_rounds, self.n_classes), &self.trees).unwrap();
		for (mut logits, example) in probabilities
			.axis_iter_mut(Axis(0))
			.zip(features.axis_iter(Axis(0)))
		{
			for (logit, bias) in logits.iter_mut().zip(self.biases.iter()) {
				*logit = *bias;
			}
			for trees_for_round in trees.axis_iter(Axis(0)) {
				for (logit, tree) in logits.iter_mut().zip(trees_for_round.iter()) {
					*logit += tree.predict(example);
				}
			}
			softmax(logits);
		}
	}
}

fn grow_options(options: &BoostedTrainOptions) -> GrowOptions {
	GrowOptions {
		max_depth: options.max_depth,
		min_examples_split: options.min_examples_split,
		min_examples_leaf: options.min_examples_leaf,
		n_split_features: None,
	}
}

/// The bias for each class is the log of its prior, clamped away from zero so empty classes stay finite.
fn compute_biases(labels: &[usize], n_classes: usize, n_examples: usize) -> Vec<f32> {
	let mut counts = vec![0usize; n_classes];
	for label in labels {
		counts[*label] += 1;
	}
	counts
		.iter()
		.map(|count| {
			let prior = count.to_f32().unwrap() / n_examples.to_f32().unwrap();
			prior.max(1e-6).ln()
		})
		.collect()
}

fn sample_examples(n_examples: usize, fraction: f32, rng: &mut Xoshiro256Plus) -> Vec<usize> {
	let n_sampled = (fraction * n_examples.to_f32().unwrap())
		.ceil()
		.to_usize()
		.unwrap()
		.max(1)
		.min(n_examples);
	let mut examples: Vec<usize> = (0..n_examples).collect();
	examples.shuffle(rng);
	examples.truncate(n_sampled);
	examples
}

fn sample_features(n_features: usize, fraction: f32, rng: &mut Xoshiro256Plus) -> Vec<usize> {
	let n_sampled = (fraction * n_features.to_f32().unwrap())
		.ceil()
		.to_usize()
		.unwrap()
		.max(1)
		.min(n_features);
	let mut features: Vec<usize> = (0..n_features).collect();
	features.shuffle(rng);
	features.truncate(n_sampled);
	features
}

fn scale_leaf_values(tree: &mut Tree, factor: f32) {
	for node in tree.nodes.iter_mut() {
		if let Node::Leaf(LeafNode { value }) = node {
			*value *= factor;
		}
	}
}

fn softmax(mut logits: ArrayViewMut1<f32>) {
	let max = logits.iter().cloned().fold(f32::MIN, f32::max);
	let mut sum = 0.0;
	for logit in logits.iter_mut() {
		*logit = (*logit - max).exp();
		sum += *logit;
	}
	for logit in logits.iter_mut() {
		*logit /= sum;
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn test_options() -> BoostedTrainOptions {
		BoostedTrainOptions {
			n_rounds: 80,
			max_depth: 3,
			learning_rate: 0.3,
			row_subsample: 1.0,
			feature_subsample: 1.0,
			min_examples_split: 2,
			min_examples_leaf: 1,
			seed: 42,
		}
	}

	#[test]
	fn test_boosted_regressor_linear() {
		let features: Array2<f32> =
			Array2::from_shape_fn((20, 1), |(i, _)| i.to_f32().unwrap() / 10.0);
		let labels: Array1<f32> = features.column(0).mapv(|x| 2.0 * x + 1.0);
		let model = BoostedRegressor::train(features.view(), labels.view(), &test_options());
		let mut predictions = Array1::zeros(20);
		model.predict(features.view(), predictions.view_mut());
		for (prediction, label) in predictions.iter().zip(labels.iter()) {
			assert!((prediction - label).abs() < 0.2);
		}
	}

	#[test]
	fn test_boosted_classifier_separable() {
		let features: Array2<f32> =
			Array2::from_shape_fn((30, 1), |(i, _)| i.to_f32().unwrap() / 10.0);
		let labels: Vec<usize> = (0..30).map(|i| if i < 10 { 0 } else if i < 20 { 1 } else { 2 }).collect();
		let model = BoostedClassifier::train(features.view(), &labels, 3, &test_options());
		let mut probabilities = Array2::zeros((30, 3));
		model.predict(features.view(), probabilities.view_mut());
		for (example_index, label) in labels.iter().enumerate() {
			let mut predicted = 0;
			for class_index in 0..3 {
				if probabilities[[example_index, class_index]]
					> probabilities[[example_index, predicted]]
				{
					predicted = class_index;
				}
			}
			assert_eq!(predicted, *label);
		}
		// Probabilities are normalized.
		let row_sum: f32 = probabilities.row(0).sum();
		assert!((row_sum - 1.0).abs() < 1e-5);
	}

	#[test]
	fn test_softmax() {
		let mut logits = arr1(&[1.0, 2.0, 3.0]);
		softmax(logits.view_mut());
		assert!((logits.sum() - 1.0).abs() < 1e-6);
		assert!(logits[2] > logits[1] && logits[1] > logits[0]);
	}
}
