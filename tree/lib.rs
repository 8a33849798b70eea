/*!
This crate implements machine learning models for regression and classification using ensembles of decision trees: a bagging style random forest and a boosting style gradient boosted ensemble. The trees are grown with exact greedy splits over f32 feature matrices, which is affordable because the datasets this crate is used with have hundreds to low thousands of rows.

Features must be fully numeric and free of missing values before training or prediction; imputation happens upstream.
*/

mod boost;
mod forest;
mod train;

pub use self::boost::{BoostedClassifier, BoostedRegressor, BoostedTrainOptions};
pub use self::forest::{ForestClassifier, ForestRegressor, ForestTrainOptions};

use ndarray::prelude::*;

/// Trees are stored as a `Vec` of `Node`s. Each branch in the tree has two indexes into the `Vec`, one for each of its children.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tree {
	pub nodes: Vec<Node>,
}

impl Tree {
	/// Make a prediction for a given example.
	pub fn predict(&self, features: ArrayView1<f32>) -> f32 {
		// Start at the root node and traverse the tree until we get to a leaf.
		let mut node_index = 0;
		loop {
			match &self.nodes[node_index] {
				Node::Branch(BranchNode {
					left_child_index,
					right_child_index,
					feature_index,
					split_value,
				}) => {
					node_index = if features[*feature_index] <= *split_value {
						*left_child_index
					} else {
						*right_child_index
					};
				}
				// We made it to a leaf. The prediction is the leaf's value.
				Node::Leaf(LeafNode { value }) => return *value,
			}
		}
	}
}

/// A node is either a branch or a leaf.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

/// A `BranchNode` is a branch in a tree. An example is sent to the left child if its value for the split feature is less than or equal to the split value, and to the right child otherwise.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BranchNode {
	/// This is the index in the tree's node vector for this node's left child.
	pub left_child_index: usize,
	/// This is the index in the tree's node vector for this node's right child.
	pub right_child_index: usize,
	/// This is the index of the feature to get the value for.
	pub feature_index: usize,
	/// This is the threshold value of the split.
	pub split_value: f32,
}

/// The leaves in a tree hold the values to output for examples that get sent to them.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LeafNode {
	/// This is the value to output.
	pub value: f32,
}

#[test]
fn test_tree_predict() {
	let tree = Tree {
		nodes: vec![
			Node::Branch(BranchNode {
				left_child_index: 1,
				right_child_index: 2,
				feature_index: 0,
				split_value: 0.5,
			}),
			Node::Leaf(LeafNode { value: -1.0 }),
			Node::Leaf(LeafNode { value: 1.0 }),
		],
	};
	assert_eq!(tree.predict(arr1(&[0.0]).view()), -1.0);
	assert_eq!(tree.predict(arr1(&[0.5]).view()), -1.0);
	assert_eq!(tree.predict(arr1(&[0.6]).view()), 1.0);
}
