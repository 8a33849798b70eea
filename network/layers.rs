use ndarray::prelude::*;
use rand::Rng;
use rand_xoshiro::Xoshiro256Plus;

/// A fully connected layer. Weights have shape (n_inputs, n_outputs).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Dense {
	pub weights: Array2<f32>,
	pub biases: Array1<f32>,
}

impl Dense {
	/// Create a layer with glorot uniform weights and zero biases.
	pub fn new(n_inputs: usize, n_outputs: usize, rng: &mut Xoshiro256Plus) -> Self {
		let limit = f32::sqrt(6.0 / (n_inputs + n_outputs) as f32);
		let weights = Array2::from_shape_fn((n_inputs, n_outputs), |_| {
			rng.gen::<f32>() * 2.0 * limit - limit
		});
		let biases = Array1::zeros(n_outputs);
		Self { weights, biases }
	}

	pub fn forward(&self, input: ArrayView2<f32>) -> Array2<f32> {
		input.dot(&self.weights) + &self.biases
	}

	/// Returns (d_input, d_weights, d_biases) for the upstream gradient `d_output`.
	pub fn backward(
		&self,
		input: ArrayView2<f32>,
		d_output: ArrayView2<f32>,
	) -> (Array2<f32>, Array2<f32>, Array1<f32>) {
		let d_weights = input.t().dot(&d_output);
		let d_biases = d_output.sum_axis(Axis(0));
		let d_input = d_output.dot(&self.weights.t());
		(d_input, d_weights, d_biases)
	}
}

/// Batch normalization over the feature axis. Batch statistics are used during training and folded into running statistics for inference.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BatchNorm {
	pub gammas: Array1<f32>,
	pub betas: Array1<f32>,
	pub running_means: Array1<f32>,
	pub running_variances: Array1<f32>,
	pub momentum: f32,
	pub epsilon: f32,
}

/// Per-batch values needed by `BatchNorm::backward`.
pub struct BatchNormCache {
	pub input: Array2<f32>,
	pub normalized: Array2<f32>,
	pub means: Array1<f32>,
	pub variances: Array1<f32>,
}

impl BatchNorm {
	pub fn new(n_features: usize) -> Self {
		Self {
			gammas: Array1::ones(n_features),
			betas: Array1::zeros(n_features),
			running_means: Array1::zeros(n_features),
			running_variances: Array1::ones(n_features),
			momentum: 0.9,
			epsilon: 1e-3,
		}
	}

	pub fn forward_infer(&self, input: ArrayView2<f32>) -> Array2<f32> {
		let std = self
			.running_variances
			.mapv(|variance| f32::sqrt(variance + self.epsilon));
		let normalized = (&input - &self.running_means) / &std;
		normalized * &self.gammas + &self.betas
	}

	pub fn forward_train(&mut self, input: ArrayView2<f32>) -> (Array2<f32>, BatchNormCache) {
		let means = input.mean_axis(Axis(0)).unwrap();
		let variances = input.var_axis(Axis(0), 0.0);
		let std = variances.mapv(|variance| f32::sqrt(variance + self.epsilon));
		let normalized = (&input - &means) / &std;
		let output = &normalized * &self.gammas + &self.betas;
		for (running, batch) in self.running_means.iter_mut().zip(means.iter()) {
			*running = self.momentum * *running + (1.0 - self.momentum) * batch;
		}
		for (running, batch) in self.running_variances.iter_mut().zip(variances.iter()) {
			*running = self.momentum * *running + (1.0 - self.momentum) * batch;
		}
		let cache = BatchNormCache {
			input: input.to_owned(),
			normalized,
			means,
			variances,
		};
		(output, cache)
	}

	/// Returns (d_input, d_gammas, d_betas) for the upstream gradient `d_output`.
	pub fn backward(
		&self,
		cache: &BatchNormCache,
		d_output: ArrayView2<f32>,
	) -> (Array2<f32>, Array1<f32>, Array1<f32>) {
		let m = cache.input.nrows() as f32;
		let epsilon = self.epsilon;
		let std = cache
			.variances
			.mapv(|variance| f32::sqrt(variance + epsilon));
		let d_gammas = (&d_output * &cache.normalized).sum_axis(Axis(0));
		let d_betas = d_output.sum_axis(Axis(0));
		let d_normalized = &d_output * &self.gammas;
		let centered = &cache.input - &cache.means;
		let d_variances = (&d_normalized * &centered).sum_axis(Axis(0))
			* cache
				.variances
				.mapv(|variance| -0.5 * (variance + epsilon).powf(-1.5));
		let sum_centered = centered.sum_axis(Axis(0));
		let d_means = d_normalized.sum_axis(Axis(0)).mapv(|v| -v) / &std
			+ &(&d_variances * &sum_centered.mapv(|v| -2.0 * v / m));
		let d_input = &d_normalized / &std
			+ &(centered * (2.0 / m) * &d_variances)
			+ &(d_means.mapv(|v| v / m));
		(d_input, d_gammas, d_betas)
	}
}

/// One hidden block: dense, relu, batch normalization, then dropout during training.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HiddenLayer {
	pub dense: Dense,
	pub norm: BatchNorm,
	pub dropout: f32,
}

pub fn relu(input: &Array2<f32>) -> Array2<f32> {
	input.mapv(|value| value.max(0.0))
}

pub fn relu_mask(input: &Array2<f32>) -> Array2<f32> {
	input.mapv(|value| if value > 0.0 { 1.0 } else { 0.0 })
}

#[cfg(test)]
mod test {
	use super::*;
	use rand::SeedableRng;

	#[test]
	fn test_dense_forward() {
		let dense = Dense {
			weights: arr2(&[[1.0, 0.0], [0.0, 2.0]]),
			biases: arr1(&[1.0, -1.0]),
		};
		let output = dense.forward(arr2(&[[3.0, 4.0]]).view());
		assert_eq!(output, arr2(&[[4.0, 7.0]]));
	}

	#[test]
	fn test_dense_new_shapes() {
		let mut rng = Xoshiro256Plus::seed_from_u64(42);
		let dense = Dense::new(18, 128, &mut rng);
		assert_eq!(dense.weights.shape(), &[18, 128]);
		assert_eq!(dense.biases.len(), 128);
	}

	#[test]
	fn test_batch_norm_forward_train_normalizes() {
		let mut norm = BatchNorm::new(1);
		let input = arr2(&[[0.0], [2.0], [4.0], [6.0]]);
		let (output, _) = norm.forward_train(input.view());
		let mean: f32 = output.column(0).sum() / 4.0;
		assert!(mean.abs() < 1e-5);
		let variance: f32 = output.column(0).mapv(|v| v * v).sum() / 4.0;
		assert!((variance - 1.0).abs() < 1e-2);
	}

	#[test]
	fn test_batch_norm_backward_shapes() {
		let mut norm = BatchNorm::new(3);
		let input = arr2(&[[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]]);
		let (_, cache) = norm.forward_train(input.view());
		let d_output = arr2(&[[1.0, 0.0, -1.0], [0.5, 0.5, 0.5]]);
		let (d_input, d_gammas, d_betas) = norm.backward(&cache, d_output.view());
		assert_eq!(d_input.shape(), &[2, 3]);
		assert_eq!(d_gammas.len(), 3);
		assert_eq!(d_betas, arr1(&[1.5, 0.5, -0.5]));
	}
}
