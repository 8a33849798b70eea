use crate::{BranchNode, LeafNode, Node, Tree};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256Plus;

/// These options control how a single tree is grown.
#[derive(Debug, Clone)]
pub struct GrowOptions {
	/// The depth of the tree will never exceed this value.
	pub max_depth: usize,
	/// A node will only be considered for splitting if it holds at least this many examples.
	pub min_examples_split: usize,
	/// A split is only valid if each resulting child holds at least this many examples.
	pub min_examples_leaf: usize,
	/// The number of candidate features sampled at each split. `None` considers every candidate feature.
	pub n_split_features: Option<usize>,
}

/// The target a tree is grown against. Classification trees store the majority class index in their leaves, regression trees the mean target value.
pub enum GrowTarget<'a> {
	Regression { targets: &'a [f32] },
	Classification { labels: &'a [usize], n_classes: usize },
}

struct Split {
	feature_index: usize,
	split_value: f32,
	gain: f64,
}

/// Grow a tree over the given examples. `examples` holds row indices into `features`, possibly with repeats when the caller bootstraps.
pub fn grow(
	features: ArrayView2<f32>,
	target: &GrowTarget,
	mut examples: Vec<usize>,
	candidate_features: &[usize],
	options: &GrowOptions,
	rng: &mut Xoshiro256Plus,
) -> Tree {
	let mut nodes = Vec::new();
	grow_node(
		&mut nodes,
		features,
		target,
		&mut examples,
		0,
		candidate_features,
		options,
		rng,
	);
	Tree { nodes }
}

#[allow(clippy::too_many_arguments)]
fn grow_node(
	nodes: &mut Vec<Node>,
	features: ArrayView2<f32>,
	target: &GrowTarget,
	examples: &mut [usize],
	depth: usize,
	candidate_features: &[usize],
	options: &GrowOptions,
	rng: &mut Xoshiro256Plus,
) -> usize {
	// Insert this node as a leaf first. It is replaced with a branch below if a valid split is found.
	let node_index = nodes.len();
	nodes.push(Node::Leaf(LeafNode {
		value: leaf_value(target, examples),
	}));
	if depth >= options.max_depth || examples.len() < options.min_examples_split {
		return node_index;
	}
	let mut pool: Vec<usize> = candidate_features.to_vec();
	let considered: &[usize] = match options.n_split_features {
		Some(k) if k < pool.len() => {
			pool.shuffle(rng);
			&pool[..k]
		}
		_ => &pool,
	};
	let best_split = considered
		.iter()
		.filter_map(|feature_index| {
			choose_best_split_for_feature(features, target, examples, *feature_index, options)
		})
		.max_by(|a, b| a.gain.partial_cmp(&b.gain).unwrap());
	let best_split = match best_split {
		Some(best_split) if best_split.gain > 0.0 => best_split,
		_ => return node_index,
	};
	// Partition the examples by the chosen split and grow the children.
	let split_point = partition(features, examples, &best_split);
	let (left_examples, right_examples) = examples.split_at_mut(split_point);
	let left_child_index = grow_node(
		nodes,
		features,
		target,
		left_examples,
		depth + 1,
		candidate_features,
		options,
		rng,
	);
	let right_child_index = grow_node(
		nodes,
		features,
		target,
		right_examples,
		depth + 1,
		candidate_features,
		options,
		rng,
	);
	nodes[node_index] = Node::Branch(BranchNode {
		left_child_index,
		right_child_index,
		feature_index: best_split.feature_index,
		split_value: best_split.split_value,
	});
	node_index
}

fn leaf_value(target: &GrowTarget, examples: &[usize]) -> f32 {
	match target {
		GrowTarget::Regression { targets } => {
			let sum: f64 = examples
				.iter()
				.map(|example| targets[*example].to_f64().unwrap())
				.sum();
			(sum / examples.len().to_f64().unwrap()) as f32
		}
		GrowTarget::Classification { labels, n_classes } => {
			let mut counts = vec![0usize; *n_classes];
			for example in examples {
				counts[labels[*example]] += 1;
			}
			let mut majority = 0;
			for (class_index, count) in counts.iter().enumerate() {
				if *count > counts[majority] {
					majority = class_index;
				}
			}
			majority.to_f32().unwrap()
		}
	}
}

fn choose_best_split_for_feature(
	features: ArrayView2<f32>,
	target: &GrowTarget,
	examples: &[usize],
	feature_index: usize,
	options: &GrowOptions,
) -> Option<Split> {
	let mut sorted: Vec<usize> = examples.to_vec();
	sorted.sort_by(|a, b| {
		features[[*a, feature_index]]
			.partial_cmp(&features[[*b, feature_index]])
			.unwrap()
	});
	match target {
		GrowTarget::Regression { targets } => {
			choose_best_regression_split(features, targets, &sorted, feature_index, options)
		}
		GrowTarget::Classification { labels, n_classes } => choose_best_classification_split(
			features,
			labels,
			*n_classes,
			&sorted,
			feature_index,
			options,
		),
	}
}

/// The gain of a regression split is the decrease in the total squared error, where the squared error of a group is sum_sq - sum^2 / n.
fn choose_best_regression_split(
	features: ArrayView2<f32>,
	targets: &[f32],
	sorted: &[usize],
	feature_index: usize,
	options: &GrowOptions,
) -> Option<Split> {
	let n = sorted.len();
	let mut total_sum = 0.0f64;
	let mut total_sum_sq = 0.0f64;
	for example in sorted {
		let target = targets[*example].to_f64().unwrap();
		total_sum += target;
		total_sum_sq += target * target;
	}
	let parent_error = total_sum_sq - total_sum * total_sum / n.to_f64().unwrap();
	let mut left_sum = 0.0f64;
	let mut left_sum_sq = 0.0f64;
	let mut best: Option<Split> = None;
	for (i, example) in sorted.iter().enumerate().take(n - 1) {
		let target = targets[*example].to_f64().unwrap();
		left_sum += target;
		left_sum_sq += target * target;
		let n_left = i + 1;
		let n_right = n - n_left;
		if n_left < options.min_examples_leaf || n_right < options.min_examples_leaf {
			continue;
		}
		let value = features[[*example, feature_index]];
		let next_value = features[[sorted[i + 1], feature_index]];
		// Splits are only valid between distinct feature values.
		if value == next_value {
			continue;
		}
		let left_error = left_sum_sq - left_sum * left_sum / n_left.to_f64().unwrap();
		let right_sum = total_sum - left_sum;
		let right_error =
			(total_sum_sq - left_sum_sq) - right_sum * right_sum / n_right.to_f64().unwrap();
		let gain = parent_error - left_error - right_error;
		if best.as_ref().map(|best| gain > best.gain).unwrap_or(true) {
			best = Some(Split {
				feature_index,
				split_value: (value + next_value) / 2.0,
				gain,
			});
		}
	}
	best
}

/// The gain of a classification split is the decrease in the example-weighted gini impurity.
fn choose_best_classification_split(
	features: ArrayView2<f32>,
	labels: &[usize],
	n_classes: usize,
	sorted: &[usize],
	feature_index: usize,
	options: &GrowOptions,
) -> Option<Split> {
	let n = sorted.len();
	let mut total_counts = vec![0usize; n_classes];
	for example in sorted {
		total_counts[labels[*example]] += 1;
	}
	let parent_impurity = weighted_gini(&total_counts, n);
	let mut left_counts = vec![0usize; n_classes];
	let mut best: Option<Split> = None;
	for (i, example) in sorted.iter().enumerate().take(n - 1) {
		left_counts[labels[*example]] += 1;
		let n_left = i + 1;
		let n_right = n - n_left;
		if n_left < options.min_examples_leaf || n_right < options.min_examples_leaf {
			continue;
		}
		let value = features[[*example, feature_index]];
		let next_value = features[[sorted[i + 1], feature_index]];
		if value == next_value {
			continue;
		}
		let right_counts: Vec<usize> = total_counts
			.iter()
			.zip(left_counts.iter())
			.map(|(total, left)| total - left)
			.collect();
		let gain = parent_impurity
			- weighted_gini(&left_counts, n_left)
			- weighted_gini(&right_counts, n_right);
		if best.as_ref().map(|best| gain > best.gain).unwrap_or(true) {
			best = Some(Split {
				feature_index,
				split_value: (value + next_value) / 2.0,
				gain,
			});
		}
	}
	best
}

/// Gini impurity of a group scaled by the number of examples in the group, so gains across groups of different sizes are comparable.
fn weighted_gini(counts: &[usize], n: usize) -> f64 {
	let n = n.to_f64().unwrap();
	let sum_sq: f64 = counts
		.iter()
		.map(|count| {
			let count = count.to_f64().unwrap();
			count * count
		})
		.sum();
	n - sum_sq / n
}

/// Reorder `examples` so the examples that go left under the split form a prefix, and return the length of that prefix.
fn partition(features: ArrayView2<f32>, examples: &mut [usize], split: &Split) -> usize {
	let (left, right): (Vec<usize>, Vec<usize>) = examples
		.iter()
		.partition(|example| features[[**example, split.feature_index]] <= split.split_value);
	let split_point = left.len();
	for (slot, example) in examples.iter_mut().zip(left.into_iter().chain(right)) {
		*slot = example;
	}
	split_point
}
