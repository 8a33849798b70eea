/*!
This module runs the whole training pipeline: clean the measurements, score and label them, prepare and split the features, fit the preprocessors on the classification training split, train the three model families, evaluate them on the held out test splits, and persist every artifact under one run id.

A failure inside one family is isolated: it is reported in the returned `TrainReport` and the remaining families still train.
*/

use crate::{
	clean::{self, CleanSummary},
	config::{self, Config},
	id::Id,
	model::{self, ModelFamily, TaskKind},
	prepare,
	progress::Progress,
	wqi::Standards,
};
use anyhow::{format_err, Result};
use ndarray::prelude::*;
use rand::SeedableRng;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use waterline_features::{MedianImputer, StandardScaler};
use waterline_metrics::{
	Accuracy, RegressionMetrics, RegressionMetricsInput, RegressionMetricsOutput, StreamingMetric,
};
use waterline_network::{NetworkClassifier, NetworkRegressor, NetworkTrainOptions};
use waterline_tree::{
	BoostedClassifier, BoostedRegressor, BoostedTrainOptions, ForestClassifier, ForestRegressor,
	ForestTrainOptions,
};

#[derive(Debug)]
pub struct TrainReport {
	pub train_run_id: Id,
	pub clean_summary: CleanSummary,
	pub n_examples: usize,
	pub n_train: usize,
	pub n_test: usize,
	pub mean_wqi: f32,
	pub feature_names: Vec<String>,
	pub class_distribution: Vec<(String, usize)>,
	pub families: Vec<FamilyReport>,
}

#[derive(Debug)]
pub struct FamilyReport {
	pub family: ModelFamily,
	pub outcome: FamilyOutcome,
}

#[derive(Debug)]
pub enum FamilyOutcome {
	Trained(FamilyMetrics),
	Failed(String),
}

#[derive(Debug)]
pub struct FamilyMetrics {
	/// Test accuracy of the family's classifier.
	pub accuracy: f32,
	/// Test R² of the family's regressor.
	pub r2: f32,
	/// Test root mean squared error of the family's regressor.
	pub rmse: f32,
}

struct SplitData {
	features_train_class: Array2<f32>,
	features_test_class: Array2<f32>,
	labels_train_class: Vec<usize>,
	labels_test_class: Vec<usize>,
	features_train_reg: Array2<f32>,
	features_test_reg: Array2<f32>,
	wqi_train: Array1<f32>,
	wqi_test: Array1<f32>,
	n_classes: usize,
}

/// Train every model family from the measurements csv at `file_path` and write the artifact bundle to `output_dir`.
pub fn train(
	file_path: &Path,
	config_path: Option<&Path>,
	output_dir: &Path,
	update_progress: &mut dyn FnMut(Progress),
) -> Result<TrainReport> {
	// Load the config from the config file, if provided.
	let config = config::load_config(config_path)?;
	let standards = Standards::reference();

	// Load and clean the measurements.
	update_progress(Progress::Loading);
	let (dataframe, clean_summary) = clean::load_and_clean(file_path)?;

	// Score, label, and drop unscorable samples.
	update_progress(Progress::Scoring);
	let prepared = prepare::prepare(&dataframe, &standards)?;
	let n_examples = prepared.features.nrows();
	if n_examples < 10 {
		return Err(format_err!(
			"need at least 10 labeled samples to train, found {}",
			n_examples
		));
	}

	// Split. The classification split is stratified by class, the regression split is not.
	let test_fraction = config
		.as_ref()
		.and_then(|config| config.test_fraction)
		.unwrap_or(0.2);
	let seed = config.as_ref().and_then(|config| config.seed).unwrap_or(42);
	let mut rng = rand_xoshiro::Xoshiro256Plus::seed_from_u64(seed);
	let (train_class, test_class) =
		prepare::stratified_train_test_split(&prepared.labels, test_fraction, &mut rng);
	let (train_reg, test_reg) = prepare::train_test_split(n_examples, test_fraction, &mut rng);

	let mut features_train_class = prepare::take_rows(&prepared.features, &train_class);
	let mut features_test_class = prepare::take_rows(&prepared.features, &test_class);
	let mut features_train_reg = prepare::take_rows(&prepared.features, &train_reg);
	let mut features_test_reg = prepare::take_rows(&prepared.features, &test_reg);

	// Fit the imputer and scaler on the classification training split only, then apply them to every split.
	let imputer = MedianImputer::fit(features_train_class.view())?;
	imputer.transform(features_train_class.view_mut());
	imputer.transform(features_test_class.view_mut());
	imputer.transform(features_train_reg.view_mut());
	imputer.transform(features_test_reg.view_mut());
	let scaler = StandardScaler::fit(features_train_class.view());
	scaler.transform(features_train_class.view_mut());
	scaler.transform(features_test_class.view_mut());
	scaler.transform(features_train_reg.view_mut());
	scaler.transform(features_test_reg.view_mut());

	let data = SplitData {
		labels_train_class: train_class.iter().map(|i| prepared.labels[*i]).collect(),
		labels_test_class: test_class.iter().map(|i| prepared.labels[*i]).collect(),
		wqi_train: train_reg.iter().map(|i| prepared.wqi[*i]).collect(),
		wqi_test: test_reg.iter().map(|i| prepared.wqi[*i]).collect(),
		features_train_class,
		features_test_class,
		features_train_reg,
		features_test_reg,
		n_classes: prepared.label_encoder.n_classes(),
	};

	// Persist the preprocessor set under a fresh run id. The models written below carry the same id, which makes the bundle refuse to load with artifacts from another run.
	let train_run_id = Id::new();
	model::write_artifact(output_dir, model::IMPUTER_FILE_NAME, train_run_id, &imputer)?;
	model::write_artifact(output_dir, model::SCALER_FILE_NAME, train_run_id, &scaler)?;
	model::write_artifact(
		output_dir,
		model::LABEL_ENCODER_FILE_NAME,
		train_run_id,
		&prepared.label_encoder,
	)?;
	model::write_artifact(
		output_dir,
		model::FEATURE_NAMES_FILE_NAME,
		train_run_id,
		&prepared.feature_names,
	)?;

	// Train each family, isolating failures so the remaining families still run.
	let mut families = Vec::with_capacity(ModelFamily::ALL.len());
	for family in ModelFamily::ALL.iter() {
		update_progress(Progress::Training(*family));
		let outcome = run_family(|| match family {
			ModelFamily::Forest => train_forest(
				&data,
				&forest_options(config.as_ref(), seed),
				train_run_id,
				output_dir,
			),
			ModelFamily::Boosted => train_boosted(
				&data,
				&boosted_options(config.as_ref(), seed),
				train_run_id,
				output_dir,
			),
			ModelFamily::Network => train_network(
				&data,
				&network_options(config.as_ref(), seed),
				train_run_id,
				output_dir,
			),
		});
		update_progress(Progress::Testing(*family));
		families.push(FamilyReport {
			family: *family,
			outcome,
		});
	}

	let class_distribution = class_distribution(&prepared);
	Ok(TrainReport {
		train_run_id,
		clean_summary,
		n_examples,
		n_train: data.labels_train_class.len(),
		n_test: data.labels_test_class.len(),
		mean_wqi: prepared.wqi.mean().unwrap_or(f32::NAN),
		feature_names: prepared.feature_names,
		class_distribution,
		families,
	})
}

fn class_distribution(prepared: &prepare::PreparedData) -> Vec<(String, usize)> {
	let mut counts = vec![0usize; prepared.label_encoder.n_classes()];
	for label in prepared.labels.iter() {
		counts[*label] += 1;
	}
	counts
		.into_iter()
		.enumerate()
		.map(|(code, count)| {
			let class = prepared.label_encoder.decode(code).unwrap().to_owned();
			(class, count)
		})
		.collect()
}

fn run_family(f: impl FnOnce() -> Result<FamilyMetrics>) -> FamilyOutcome {
	match catch_unwind(AssertUnwindSafe(f)) {
		Ok(Ok(metrics)) => FamilyOutcome::Trained(metrics),
		Ok(Err(error)) => FamilyOutcome::Failed(error.to_string()),
		Err(panic) => FamilyOutcome::Failed(panic_message(panic)),
	}
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
	if let Some(message) = panic.downcast_ref::<&str>() {
		(*message).to_owned()
	} else if let Some(message) = panic.downcast_ref::<String>() {
		message.clone()
	} else {
		"training panicked".to_owned()
	}
}

fn train_forest(
	data: &SplitData,
	options: &ForestTrainOptions,
	train_run_id: Id,
	output_dir: &Path,
) -> Result<FamilyMetrics> {
	let classifier = ForestClassifier::train(
		data.features_train_class.view(),
		&data.labels_train_class,
		data.n_classes,
		options,
	);
	let accuracy = classifier_accuracy(
		|probabilities| classifier.predict(data.features_test_class.view(), probabilities),
		data,
	);
	let regressor = ForestRegressor::train(
		data.features_train_reg.view(),
		data.wqi_train.view(),
		options,
	);
	let regression = regressor_metrics(
		|predictions| regressor.predict(data.features_test_reg.view(), predictions),
		data,
	);
	model::write_artifact(
		output_dir,
		model::model_file_name(ModelFamily::Forest, TaskKind::Classifier),
		train_run_id,
		&classifier,
	)?;
	model::write_artifact(
		output_dir,
		model::model_file_name(ModelFamily::Forest, TaskKind::Regressor),
		train_run_id,
		&regressor,
	)?;
	Ok(FamilyMetrics {
		accuracy,
		r2: regression.r2,
		rmse: regression.rmse,
	})
}

fn train_boosted(
	data: &SplitData,
	options: &BoostedTrainOptions,
	train_run_id: Id,
	output_dir: &Path,
) -> Result<FamilyMetrics> {
	let classifier = BoostedClassifier::train(
		data.features_train_class.view(),
		&data.labels_train_class,
		data.n_classes,
		options,
	);
	let accuracy = classifier_accuracy(
		|probabilities| classifier.predict(data.features_test_class.view(), probabilities),
		data,
	);
	let regressor = BoostedRegressor::train(
		data.features_train_reg.view(),
		data.wqi_train.view(),
		options,
	);
	let regression = regressor_metrics(
		|predictions| regressor.predict(data.features_test_reg.view(), predictions),
		data,
	);
	model::write_artifact(
		output_dir,
		model::model_file_name(ModelFamily::Boosted, TaskKind::Classifier),
		train_run_id,
		&classifier,
	)?;
	model::write_artifact(
		output_dir,
		model::model_file_name(ModelFamily::Boosted, TaskKind::Regressor),
		train_run_id,
		&regressor,
	)?;
	Ok(FamilyMetrics {
		accuracy,
		r2: regression.r2,
		rmse: regression.rmse,
	})
}

fn train_network(
	data: &SplitData,
	options: &NetworkTrainOptions,
	train_run_id: Id,
	output_dir: &Path,
) -> Result<FamilyMetrics> {
	let classifier = NetworkClassifier::train(
		data.features_train_class.view(),
		&data.labels_train_class,
		data.n_classes,
		options,
	);
	let accuracy = classifier_accuracy(
		|probabilities| classifier.predict(data.features_test_class.view(), probabilities),
		data,
	);
	let regressor = NetworkRegressor::train(
		data.features_train_reg.view(),
		data.wqi_train.view(),
		options,
	);
	let regression = regressor_metrics(
		|predictions| regressor.predict(data.features_test_reg.view(), predictions),
		data,
	);
	model::write_artifact(
		output_dir,
		model::model_file_name(ModelFamily::Network, TaskKind::Classifier),
		train_run_id,
		&classifier,
	)?;
	model::write_artifact(
		output_dir,
		model::model_file_name(ModelFamily::Network, TaskKind::Regressor),
		train_run_id,
		&regressor,
	)?;
	Ok(FamilyMetrics {
		accuracy,
		r2: regression.r2,
		rmse: regression.rmse,
	})
}

fn classifier_accuracy(
	predict: impl FnOnce(ArrayViewMut2<f32>),
	data: &SplitData,
) -> f32 {
	let mut probabilities = Array2::zeros((data.labels_test_class.len(), data.n_classes));
	predict(probabilities.view_mut());
	let mut accuracy = Accuracy::new();
	for (probabilities, label) in probabilities
		.axis_iter(Axis(0))
		.zip(data.labels_test_class.iter())
	{
		let mut predicted = 0;
		for (class_index, probability) in probabilities.iter().enumerate() {
			if *probability > probabilities[predicted] {
				predicted = class_index;
			}
		}
		accuracy.update((predicted, *label));
	}
	accuracy.finalize().unwrap_or(0.0)
}

fn regressor_metrics(
	predict: impl FnOnce(ArrayViewMut1<f32>),
	data: &SplitData,
) -> RegressionMetricsOutput {
	let mut predictions = Array1::zeros(data.wqi_test.len());
	predict(predictions.view_mut());
	let mut metrics = RegressionMetrics::new();
	metrics.update(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: data.wqi_test.view(),
	});
	metrics.finalize()
}

fn forest_options(config: Option<&Config>, seed: u64) -> ForestTrainOptions {
	let mut options = ForestTrainOptions {
		seed,
		..ForestTrainOptions::default()
	};
	if let Some(config) = config.and_then(|config| config.forest.as_ref()) {
		if let Some(n_trees) = config.n_trees {
			options.n_trees = n_trees;
		}
		if let Some(max_depth) = config.max_depth {
			options.max_depth = max_depth;
		}
		if let Some(min_examples_split) = config.min_examples_split {
			options.min_examples_split = min_examples_split;
		}
		if let Some(min_examples_leaf) = config.min_examples_leaf {
			options.min_examples_leaf = min_examples_leaf;
		}
	}
	options
}

fn boosted_options(config: Option<&Config>, seed: u64) -> BoostedTrainOptions {
	let mut options = BoostedTrainOptions {
		seed,
		..BoostedTrainOptions::default()
	};
	if let Some(config) = config.and_then(|config| config.boosted.as_ref()) {
		if let Some(n_rounds) = config.n_rounds {
			options.n_rounds = n_rounds;
		}
		if let Some(max_depth) = config.max_depth {
			options.max_depth = max_depth;
		}
		if let Some(learning_rate) = config.learning_rate {
			options.learning_rate = learning_rate;
		}
		if let Some(row_subsample) = config.row_subsample {
			options.row_subsample = row_subsample;
		}
		if let Some(feature_subsample) = config.feature_subsample {
			options.feature_subsample = feature_subsample;
		}
	}
	options
}

fn network_options(config: Option<&Config>, seed: u64) -> NetworkTrainOptions {
	let mut options = NetworkTrainOptions {
		seed,
		..NetworkTrainOptions::default()
	};
	if let Some(config) = config.and_then(|config| config.network.as_ref()) {
		if let Some(max_epochs) = config.max_epochs {
			options.max_epochs = max_epochs;
		}
		if let Some(n_examples_per_batch) = config.n_examples_per_batch {
			options.n_examples_per_batch = n_examples_per_batch;
		}
		if let Some(learning_rate) = config.learning_rate {
			options.learning_rate = learning_rate;
		}
		if let Some(validation_fraction) = config.validation_fraction {
			options.validation_fraction = validation_fraction;
		}
		if let Some(early_stopping_patience) = config.early_stopping_patience {
			options.early_stopping_patience = early_stopping_patience;
		}
	}
	options
}
