/*!
This crate implements small feed forward neural networks for classification and regression. Each hidden layer is a dense layer with relu activation followed by batch normalization and dropout. Training uses Adam over mini batches with early stopping against a held out validation slice, restoring the best weights seen.

Like the tree ensembles, the networks expect fully numeric features with no missing values; imputation and scaling happen upstream.
*/

mod layers;
mod train;

pub use self::layers::{BatchNorm, Dense, HiddenLayer};
pub use self::train::{EarlyStoppingMonitor, NetworkTrainOptions};

use itertools::izip;
use ndarray::prelude::*;
use self::train::{fit, forward_infer, softmax, Target};

/// A feed forward multiclass classifier with a softmax output layer, trained with categorical cross entropy.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NetworkClassifier {
	pub layers: Vec<HiddenLayer>,
	pub output: Dense,
	pub n_classes: usize,
}

impl NetworkClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: &[usize],
		n_classes: usize,
		options: &NetworkTrainOptions,
	) -> Self {
		let (layers, output) = fit(features, &Target::Classes { labels, n_classes }, options);
		Self {
			layers,
			output,
			n_classes,
		}
	}

	/// Write class probabilities into `probabilities`, shape (n_examples, n_classes).
	pub fn predict(&self, features: ArrayView2<f32>, mut probabilities: ArrayViewMut2<f32>) {
		let logits = forward_infer(&self.layers, &self.output, features);
		for (mut probabilities, logits) in izip!(
			probabilities.axis_iter_mut(Axis(0)),
			logits.axis_iter(Axis(0))
		) {
			probabilities.assign(&logits);
			softmax(probabilities.view_mut());
		}
	}
}

/// A feed forward regressor with a single linear output unit, trained with mean squared error.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NetworkRegressor {
	pub layers: Vec<HiddenLayer>,
	pub output: Dense,
}

impl NetworkRegressor {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<f32>,
		options: &NetworkTrainOptions,
	) -> Self {
		let labels = labels.to_vec();
		let (layers, output) = fit(features, &Target::Values { labels: &labels }, options);
		Self { layers, output }
	}

	/// Write predictions into `predictions` for the input `features`.
	pub fn predict(&self, features: ArrayView2<f32>, mut predictions: ArrayViewMut1<f32>) {
		let outputs = forward_infer(&self.layers, &self.output, features);
		for (prediction, output) in izip!(predictions.iter_mut(), outputs.column(0).iter()) {
			*prediction = *output;
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use num_traits::ToPrimitive;

	fn test_options() -> NetworkTrainOptions {
		NetworkTrainOptions {
			hidden_layer_sizes: vec![16, 8],
			dropout: vec![0.0, 0.0],
			learning_rate: 0.01,
			max_epochs: 200,
			n_examples_per_batch: 16,
			validation_fraction: 0.2,
			early_stopping_patience: 25,
			seed: 42,
		}
	}

	fn interleaved_features(n: usize) -> (Array2<f32>, Vec<usize>) {
		// Examples alternate between the classes so the validation tail holds both.
		let features = Array2::from_shape_fn((n, 2), |(i, j)| {
			let x = (i / 2).to_f32().unwrap() / n.to_f32().unwrap();
			if j == 0 {
				if i % 2 == 0 {
					x
				} else {
					x + 2.0
				}
			} else {
				1.0
			}
		});
		let labels: Vec<usize> = (0..n).map(|i| i % 2).collect();
		(features, labels)
	}

	#[test]
	fn test_classifier_separable() {
		let (features, labels) = interleaved_features(64);
		let model = NetworkClassifier::train(features.view(), &labels, 2, &test_options());
		let mut probabilities = Array2::zeros((64, 2));
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
		assert!(n_correct >= 56);
		let row_sum: f32 = probabilities.row(0).sum();
		assert!((row_sum - 1.0).abs() < 1e-5);
	}

	#[test]
	fn test_regressor_linear() {
		let features = Array2::from_shape_fn((64, 1), |(i, _)| i.to_f32().unwrap() / 32.0);
		let labels: Array1<f32> = features.column(0).mapv(|x| 3.0 * x - 1.0);
		let model = NetworkRegressor::train(features.view(), labels.view(), &test_options());
		let mut predictions = Array1::zeros(64);
		model.predict(features.view(), predictions.view_mut());
		let mut squared_error = 0.0f32;
		let mut variance = 0.0f32;
		let mean = labels.mean().unwrap();
		for (prediction, label) in predictions.iter().zip(labels.iter()) {
			squared_error += (prediction - label) * (prediction - label);
			variance += (label - mean) * (label - mean);
		}
		assert!(squared_error < 0.5 * variance);
	}

	#[test]
	fn test_predict_is_deterministic() {
		let (features, labels) = interleaved_features(32);
		let model = NetworkClassifier::train(features.view(), &labels, 2, &test_options());
		let mut probabilities_a = Array2::zeros((32, 2));
		let mut probabilities_b = Array2::zeros((32, 2));
		model.predict(features.view(), probabilities_a.view_mut());
		model.predict(features.view(), probabilities_b.view_mut());
		assert_eq!(probabilities_a, probabilities_b);
	}
}
