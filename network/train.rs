use crate::layers::{relu, relu_mask, BatchNormCache, Dense, HiddenLayer};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// These are the options passed to `NetworkClassifier::train` and `NetworkRegressor::train`.
#[derive(Debug, Clone)]
pub struct NetworkTrainOptions {
	/// The widths of the hidden layers.
	pub hidden_layer_sizes: Vec<usize>,
	/// The dropout rate applied after each hidden layer during training. Must have one entry per hidden layer.
	pub dropout: Vec<f32>,
	/// The Adam learning rate.
	pub learning_rate: f32,
	/// This is the maximum number of epochs of training. Fewer epochs may run if early stopping triggers.
	pub max_epochs: usize,
	pub n_examples_per_batch: usize,
	/// The fraction of the training examples held out to compute the early stopping metric.
	pub validation_fraction: f32,
	/// Training stops after this many epochs without an improvement in the validation loss, and the best weights seen are restored.
	pub early_stopping_patience: usize,
	pub seed: u64,
}

impl Default for NetworkTrainOptions {
	fn default() -> Self {
		Self {
			hidden_layer_sizes: vec![128, 64, 32],
			dropout: vec![0.3, 0.3, 0.2],
			learning_rate: 0.001,
			max_epochs: 100,
			n_examples_per_batch: 32,
			validation_fraction: 0.2,
			early_stopping_patience: 15,
			seed: 42,
		}
	}
}

pub enum Target<'a> {
	Classes {
		labels: &'a [usize],
		n_classes: usize,
	},
	Values {
		labels: &'a [f32],
	},
}

impl<'a> Target<'a> {
	fn n_outputs(&self) -> usize {
		match self {
			Target::Classes { n_classes, .. } => *n_classes,
			Target::Values { .. } => 1,
		}
	}

	fn len(&self) -> usize {
		match self {
			Target::Classes { labels, .. } => labels.len(),
			Target::Values { labels } => labels.len(),
		}
	}
}

/// Train the hidden layers and output layer against the target. The tail `validation_fraction` of the examples is held out for early stopping.
pub fn fit(
	features: ArrayView2<f32>,
	target: &Target,
	options: &NetworkTrainOptions,
) -> (Vec<HiddenLayer>, Dense) {
	assert_eq!(features.nrows(), target.len());
	assert_eq!(options.hidden_layer_sizes.len(), options.dropout.len());
	let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
	let n_outputs = target.n_outputs();
	let split_index = ((1.0 - options.validation_fraction)
		* features.nrows().to_f32().unwrap())
	.to_usize()
	.unwrap();
	let (features_train, features_validation) = features.split_at(Axis(0), split_index);
	// Initialize the layers.
	let mut layers = Vec::with_capacity(options.hidden_layer_sizes.len());
	let mut n_inputs = features.ncols();
	for (size, dropout) in options
		.hidden_layer_sizes
		.iter()
		.zip(options.dropout.iter())
	{
		layers.push(HiddenLayer {
			dense: Dense::new(n_inputs, *size, &mut rng),
			norm: crate::layers::BatchNorm::new(*size),
			dropout: *dropout,
		});
		n_inputs = *size;
	}
	let mut output = Dense::new(n_inputs, n_outputs, &mut rng);
	let mut optimizer = Adam::new(&layers, &output);
	let mut early_stopping_monitor =
		EarlyStoppingMonitor::new(1e-4, options.early_stopping_patience);
	let mut best: Option<(f32, Vec<HiddenLayer>, Dense)> = None;
	let mut example_indices: Vec<usize> = (0..features_train.nrows()).collect();
	for _ in 0..options.max_epochs {
		example_indices.shuffle(&mut rng);
		for batch_indices in example_indices.chunks(options.n_examples_per_batch) {
			let batch_features = features_train.select(Axis(0), batch_indices);
			train_batch(
				&mut layers,
				&mut output,
				&mut optimizer,
				batch_features.view(),
				batch_indices,
				target,
				options,
				&mut rng,
			);
		}
		let validation_loss = if features_validation.nrows() > 0 {
			compute_loss(&layers, &output, features_validation, split_index, target)
		} else {
			compute_loss(&layers, &output, features_train, 0, target)
		};
		if best
			.as_ref()
			.map(|(best_loss, _, _)| validation_loss < *best_loss)
			.unwrap_or(true)
		{
			best = Some((validation_loss, layers.clone(), output.clone()));
		}
		if early_stopping_monitor.update(validation_loss) {
			break;
		}
	}
	// Restore the best weights seen during training.
	match best {
		Some((_, best_layers, best_output)) => (best_layers, best_output),
		None => (layers, output),
	}
}

#[allow(clippy::too_many_arguments)]
fn train_batch(
	layers: &mut [HiddenLayer],
	output: &mut Dense,
	optimizer: &mut Adam,
	batch_features: ArrayView2<f32>,
	batch_indices: &[usize],
	target: &Target,
	options: &NetworkTrainOptions,
	rng: &mut Xoshiro256Plus,
) {
	let batch_size = batch_features.nrows();
	// Forward pass, keeping the per-layer values needed for backprop.
	struct LayerCache {
		input: Array2<f32>,
		z: Array2<f32>,
		norm: BatchNormCache,
		mask: Array2<f32>,
	}
	let mut caches = Vec::with_capacity(layers.len());
	let mut hidden = batch_features.to_owned();
	for layer in layers.iter_mut() {
		let input = hidden;
		let z = layer.dense.forward(input.view());
		let activated = relu(&z);
		let (normalized, norm_cache) = layer.norm.forward_train(activated.view());
		let keep = 1.0 - layer.dropout;
		let mask = if layer.dropout > 0.0 {
			Array2::from_shape_fn(normalized.raw_dim(), |_| {
				if rng.gen::<f32>() < keep {
					1.0 / keep
				} else {
					0.0
				}
			})
		} else {
			Array2::ones(normalized.raw_dim())
		};
		hidden = &normalized * &mask;
		caches.push(LayerCache {
			input,
			z,
			norm: norm_cache,
			mask,
		});
	}
	let logits = output.forward(hidden.view());
	// Gradient of the loss with respect to the output layer's pre-activation.
	let mut d_logits = match target {
		Target::Classes { labels, n_classes } => {
			let mut probabilities = logits;
			for mut row in probabilities.axis_iter_mut(Axis(0)) {
				softmax(row.view_mut());
			}
			for (row_index, example_index) in batch_indices.iter().enumerate() {
				probabilities[[row_index, labels[*example_index]]] -= 1.0;
			}
			debug_assert!(*n_classes == probabilities.ncols());
			probabilities
		}
		Target::Values { labels } => {
			let mut d = logits;
			for (row_index, example_index) in batch_indices.iter().enumerate() {
				d[[row_index, 0]] = 2.0 * (d[[row_index, 0]] - labels[*example_index]);
			}
			d
		}
	};
	d_logits.map_inplace(|value| *value /= batch_size.to_f32().unwrap());
	// Backward pass.
	let (mut d_hidden, d_weights, d_biases) = output.backward(hidden.view(), d_logits.view());
	optimizer.t += 1;
	optimizer.output.step(
		output,
		&d_weights,
		&d_biases,
		options.learning_rate,
		optimizer.t,
	);
	for (layer, (cache, adam)) in layers
		.iter_mut()
		.zip(caches.iter().zip(optimizer.hidden.iter_mut()))
		.rev()
	{
		let d_normalized = &d_hidden * &cache.mask;
		let (d_activated, d_gammas, d_betas) = layer.norm.backward(&cache.norm, d_normalized.view());
		let d_z = d_activated * relu_mask(&cache.z);
		let (d_input, d_weights, d_biases) = layer.dense.backward(cache.input.view(), d_z.view());
		adam.dense.step(
			&mut layer.dense,
			&d_weights,
			&d_biases,
			options.learning_rate,
			optimizer.t,
		);
		adam_step(
			&mut layer.norm.gammas,
			&d_gammas,
			&mut adam.gammas,
			options.learning_rate,
			optimizer.t,
		);
		adam_step(
			&mut layer.norm.betas,
			&d_betas,
			&mut adam.betas,
			options.learning_rate,
			optimizer.t,
		);
		d_hidden = d_input;
	}
}

/// Run the network in inference mode over `features` and compute the loss against the targets starting at `target_offset`.
fn compute_loss(
	layers: &[HiddenLayer],
	output: &Dense,
	features: ArrayView2<f32>,
	target_offset: usize,
	target: &Target,
) -> f32 {
	let logits = forward_infer(layers, output, features);
	match target {
		Target::Classes { labels, .. } => {
			let mut probabilities = logits;
			for mut row in probabilities.axis_iter_mut(Axis(0)) {
				softmax(row.view_mut());
			}
			let mut total = 0.0f32;
			for (row_index, probabilities) in probabilities.axis_iter(Axis(0)).enumerate() {
				let label = labels[target_offset + row_index];
				let probability = probabilities[label].max(f32::EPSILON).min(1.0 - f32::EPSILON);
				total += -probability.ln();
			}
			total / probabilities.nrows().to_f32().unwrap()
		}
		Target::Values { labels } => {
			let mut total = 0.0f32;
			for (row_index, prediction) in logits.column(0).iter().enumerate() {
				let error = prediction - labels[target_offset + row_index];
				total += error * error;
			}
			total / logits.nrows().to_f32().unwrap()
		}
	}
}

/// Forward pass without dropout, using the running batch norm statistics.
pub fn forward_infer(
	layers: &[HiddenLayer],
	output: &Dense,
	features: ArrayView2<f32>,
) -> Array2<f32> {
	let mut hidden = features.to_owned();
	for layer in layers.iter() {
		let z = layer.dense.forward(hidden.view());
		let activated = relu(&z);
		hidden = layer.norm.forward_infer(activated.view());
	}
	output.forward(hidden.view())
}

pub fn softmax(mut logits: ArrayViewMut1<f32>) {
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

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-8;

struct Adam {
	t: i32,
	hidden: Vec<HiddenLayerAdam>,
	output: DenseAdam,
}

struct HiddenLayerAdam {
	dense: DenseAdam,
	gammas: AdamPair<Ix1>,
	betas: AdamPair<Ix1>,
}

struct DenseAdam {
	weights: AdamPair<Ix2>,
	biases: AdamPair<Ix1>,
}

struct AdamPair<D: Dimension> {
	m: Array<f32, D>,
	v: Array<f32, D>,
}

impl Adam {
	fn new(layers: &[HiddenLayer], output: &Dense) -> Self {
		Self {
			t: 0,
			hidden: layers
				.iter()
				.map(|layer| HiddenLayerAdam {
					dense: DenseAdam::new(&layer.dense),
					gammas: AdamPair::new(layer.norm.gammas.raw_dim()),
					betas: AdamPair::new(layer.norm.betas.raw_dim()),
				})
				.collect(),
			output: DenseAdam::new(output),
		}
	}
}

impl DenseAdam {
	fn new(dense: &Dense) -> Self {
		Self {
			weights: AdamPair::new(dense.weights.raw_dim()),
			biases: AdamPair::new(dense.biases.raw_dim()),
		}
	}

	fn step(
		&mut self,
		dense: &mut Dense,
		d_weights: &Array2<f32>,
		d_biases: &Array1<f32>,
		learning_rate: f32,
		t: i32,
	) {
		adam_step(&mut dense.weights, d_weights, &mut self.weights, learning_rate, t);
		adam_step(&mut dense.biases, d_biases, &mut self.biases, learning_rate, t);
	}
}

impl<D: Dimension> AdamPair<D> {
	fn new(dim: D) -> Self {
		Self {
			m: Array::zeros(dim.clone()),
			v: Array::zeros(dim),
		}
	}
}

fn adam_step<D: Dimension>(
	param: &mut Array<f32, D>,
	gradient: &Array<f32, D>,
	pair: &mut AdamPair<D>,
	learning_rate: f32,
	t: i32,
) {
	pair.m
		.zip_mut_with(gradient, |m, g| *m = BETA1 * *m + (1.0 - BETA1) * g);
	pair.v
		.zip_mut_with(gradient, |v, g| *v = BETA2 * *v + (1.0 - BETA2) * g * g);
	let m_scale = 1.0 / (1.0 - BETA1.powi(t));
	let v_scale = 1.0 / (1.0 - BETA2.powi(t));
	for ((param, m), v) in param
		.iter_mut()
		.zip(pair.m.iter())
		.zip(pair.v.iter())
	{
		*param -= learning_rate * (m * m_scale) / ((v * v_scale).sqrt() + ADAM_EPSILON);
	}
}

/// Counts epochs without a significant decrease in the loss. `update` returns true when training should stop.
pub struct EarlyStoppingMonitor {
	threshold: f32,
	patience: usize,
	previous_loss: Option<f32>,
	n_epochs_no_improvement: usize,
}

impl EarlyStoppingMonitor {
	pub fn new(threshold: f32, patience: usize) -> Self {
		Self {
			threshold,
			patience,
			previous_loss: None,
			n_epochs_no_improvement: 0,
		}
	}

	pub fn update(&mut self, loss: f32) -> bool {
		let result = if let Some(previous_loss) = self.previous_loss {
			if loss > previous_loss || f32::abs(loss - previous_loss) < self.threshold {
				self.n_epochs_no_improvement += 1;
				self.n_epochs_no_improvement >= self.patience
			} else {
				self.n_epochs_no_improvement = 0;
				false
			}
		} else {
			false
		};
		if self
			.previous_loss
			.map(|previous_loss| loss < previous_loss)
			.unwrap_or(true)
		{
			self.previous_loss = Some(loss);
		}
		result
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_early_stopping_monitor() {
		let mut monitor = EarlyStoppingMonitor::new(0.01, 2);
		assert!(!monitor.update(1.0));
		assert!(!monitor.update(0.5));
		assert!(!monitor.update(0.6));
		assert!(monitor.update(0.7));
	}

	#[test]
	fn test_early_stopping_monitor_resets_on_improvement() {
		let mut monitor = EarlyStoppingMonitor::new(0.01, 2);
		assert!(!monitor.update(1.0));
		assert!(!monitor.update(1.1));
		assert!(!monitor.update(0.5));
		assert!(!monitor.update(0.6));
		assert!(monitor.update(0.7));
	}
}
