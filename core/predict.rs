/*!
This module serves predictions from a persisted bundle. The `Predictor` loads every artifact once at startup and then scores any number of samples read-only against that snapshot.
*/

use crate::id::Id;
use crate::model::{self, ModelFamily, TaskKind};
use crate::wqi::WaterQualityClass;
use anyhow::{format_err, Result};
use ndarray::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use waterline_features::{LabelEncoder, MedianImputer, StandardScaler};
use waterline_network::{NetworkClassifier, NetworkRegressor};
use waterline_tree::{BoostedClassifier, BoostedRegressor, ForestClassifier, ForestRegressor};

/**
A sample to score, as a mapping from parameter name to measured value. A `None` value marks a measurement that was not taken and is imputed. Every feature the bundle was trained on must appear as a key; an absent key is an error rather than a silent zero fill.
*/
pub type Sample = BTreeMap<String, Option<f32>>;

#[derive(Debug, Error)]
#[error("sample is missing features required by the model: {}", .missing.join(", "))]
pub struct MissingFeaturesError {
	pub missing: Vec<String>,
}

#[derive(Debug)]
pub struct Predictor {
	pub train_run_id: Id,
	feature_names: Vec<String>,
	imputer: MedianImputer,
	scaler: StandardScaler,
	label_encoder: LabelEncoder,
	forest_classifier: Option<ForestClassifier>,
	forest_regressor: Option<ForestRegressor>,
	boosted_classifier: Option<BoostedClassifier>,
	boosted_regressor: Option<BoostedRegressor>,
	network_classifier: Option<NetworkClassifier>,
	network_regressor: Option<NetworkRegressor>,
}

#[derive(Debug)]
pub struct PredictAllOutput {
	pub classes: Vec<(ModelFamily, String)>,
	pub wqi: Vec<(ModelFamily, f32)>,
	/// The arithmetic mean of the three regressors' predictions.
	pub mean_wqi: f32,
	pub interpretation: WaterQualityClass,
}

impl Predictor {
	/// Load the bundle from `models_dir`. The preprocessor artifacts are required; model artifacts are optional so a bundle with a failed family still loads, and dispatching to the missing family errors instead.
	pub fn load(models_dir: &Path) -> Result<Self> {
		if !models_dir.join(model::IMPUTER_FILE_NAME).exists() {
			return Err(format_err!(
				"no trained model bundle found in {}, run `waterline train` first",
				models_dir.display()
			));
		}
		let imputer = model::read_artifact::<MedianImputer>(models_dir, model::IMPUTER_FILE_NAME)?;
		let scaler = model::read_artifact::<StandardScaler>(models_dir, model::SCALER_FILE_NAME)?;
		let label_encoder =
			model::read_artifact::<LabelEncoder>(models_dir, model::LABEL_ENCODER_FILE_NAME)?;
		let feature_names =
			model::read_artifact::<Vec<String>>(models_dir, model::FEATURE_NAMES_FILE_NAME)?;
		let forest_classifier = read_optional::<ForestClassifier>(
			models_dir,
			model::model_file_name(ModelFamily::Forest, TaskKind::Classifier),
		)?;
		let forest_regressor = read_optional::<ForestRegressor>(
			models_dir,
			model::model_file_name(ModelFamily::Forest, TaskKind::Regressor),
		)?;
		let boosted_classifier = read_optional::<BoostedClassifier>(
			models_dir,
			model::model_file_name(ModelFamily::Boosted, TaskKind::Classifier),
		)?;
		let boosted_regressor = read_optional::<BoostedRegressor>(
			models_dir,
			model::model_file_name(ModelFamily::Boosted, TaskKind::Regressor),
		)?;
		let network_classifier = read_optional::<NetworkClassifier>(
			models_dir,
			model::model_file_name(ModelFamily::Network, TaskKind::Classifier),
		)?;
		let network_regressor = read_optional::<NetworkRegressor>(
			models_dir,
			model::model_file_name(ModelFamily::Network, TaskKind::Regressor),
		)?;
		// Every artifact must come from the same training run. A preprocessor from one run with models from another would silently produce wrong predictions.
		let train_run_id = imputer.train_run_id;
		let mut run_ids = vec![
			scaler.train_run_id,
			label_encoder.train_run_id,
			feature_names.train_run_id,
		];
		run_ids.extend(forest_classifier.as_ref().map(|a| a.train_run_id));
		run_ids.extend(forest_regressor.as_ref().map(|a| a.train_run_id));
		run_ids.extend(boosted_classifier.as_ref().map(|a| a.train_run_id));
		run_ids.extend(boosted_regressor.as_ref().map(|a| a.train_run_id));
		run_ids.extend(network_classifier.as_ref().map(|a| a.train_run_id));
		run_ids.extend(network_regressor.as_ref().map(|a| a.train_run_id));
		if run_ids.iter().any(|run_id| *run_id != train_run_id) {
			return Err(format_err!(
				"the model bundle in {} mixes artifacts from different training runs",
				models_dir.display()
			));
		}
		Ok(Self {
			train_run_id,
			feature_names: feature_names.value,
			imputer: imputer.value,
			scaler: scaler.value,
			label_encoder: label_encoder.value,
			forest_classifier: forest_classifier.map(|a| a.value),
			forest_regressor: forest_regressor.map(|a| a.value),
			boosted_classifier: boosted_classifier.map(|a| a.value),
			boosted_regressor: boosted_regressor.map(|a| a.value),
			network_classifier: network_classifier.map(|a| a.value),
			network_regressor: network_regressor.map(|a| a.value),
		})
	}

	pub fn feature_names(&self) -> &[String] {
		&self.feature_names
	}

	pub fn classes(&self) -> &[String] {
		&self.label_encoder.classes
	}

	/// Project the samples onto the trained feature order, then impute and scale them.
	fn features_for(&self, samples: &[Sample]) -> Result<Array2<f32>> {
		let mut missing: Vec<String> = Vec::new();
		for sample in samples {
			for feature_name in self.feature_names.iter() {
				if !sample.contains_key(feature_name) && !missing.contains(feature_name) {
					missing.push(feature_name.clone());
				}
			}
		}
		if !missing.is_empty() {
			return Err(MissingFeaturesError { missing }.into());
		}
		let mut features = Array2::zeros((samples.len(), self.feature_names.len()));
		for (mut row, sample) in features.axis_iter_mut(Axis(0)).zip(samples.iter()) {
			for (value, feature_name) in row.iter_mut().zip(self.feature_names.iter()) {
				*value = sample[feature_name].unwrap_or(f32::NAN);
			}
		}
		self.imputer.transform(features.view_mut());
		self.scaler.transform(features.view_mut());
		Ok(features)
	}

	/// Predict the class label for a batch of samples with one model family.
	pub fn predict_class_batch(
		&self,
		samples: &[Sample],
		family: ModelFamily,
	) -> Result<Vec<String>> {
		let features = self.features_for(samples)?;
		let mut probabilities =
			Array2::zeros((samples.len(), self.label_encoder.n_classes()));
		match family {
			ModelFamily::Forest => self
				.forest_classifier
				.as_ref()
				.ok_or_else(|| missing_model_error(family, TaskKind::Classifier))?
				.predict(features.view(), probabilities.view_mut()),
			ModelFamily::Boosted => self
				.boosted_classifier
				.as_ref()
				.ok_or_else(|| missing_model_error(family, TaskKind::Classifier))?
				.predict(features.view(), probabilities.view_mut()),
			ModelFamily::Network => self
				.network_classifier
				.as_ref()
				.ok_or_else(|| missing_model_error(family, TaskKind::Classifier))?
				.predict(features.view(), probabilities.view_mut()),
		}
		probabilities
			.axis_iter(Axis(0))
			.map(|probabilities| {
				let mut predicted = 0;
				for (class_index, probability) in probabilities.iter().enumerate() {
					if *probability > probabilities[predicted] {
						predicted = class_index;
					}
				}
				self.label_encoder
					.decode(predicted)
					.map(|class| class.to_owned())
					.ok_or_else(|| format_err!("predicted class {} is out of range", predicted))
			})
			.collect()
	}

	pub fn predict_class(&self, sample: &Sample, family: ModelFamily) -> Result<String> {
		let mut classes = self.predict_class_batch(std::slice::from_ref(sample), family)?;
		Ok(classes.remove(0))
	}

	/// Predict the water quality index for a batch of samples with one model family.
	pub fn predict_wqi_batch(&self, samples: &[Sample], family: ModelFamily) -> Result<Vec<f32>> {
		let features = self.features_for(samples)?;
		let mut predictions = Array1::zeros(samples.len());
		match family {
			ModelFamily::Forest => self
				.forest_regressor
				.as_ref()
				.ok_or_else(|| missing_model_error(family, TaskKind::Regressor))?
				.predict(features.view(), predictions.view_mut()),
			ModelFamily::Boosted => self
				.boosted_regressor
				.as_ref()
				.ok_or_else(|| missing_model_error(family, TaskKind::Regressor))?
				.predict(features.view(), predictions.view_mut()),
			ModelFamily::Network => self
				.network_regressor
				.as_ref()
				.ok_or_else(|| missing_model_error(family, TaskKind::Regressor))?
				.predict(features.view(), predictions.view_mut()),
		}
		Ok(predictions.to_vec())
	}

	pub fn predict_wqi(&self, sample: &Sample, family: ModelFamily) -> Result<f32> {
		let predictions = self.predict_wqi_batch(std::slice::from_ref(sample), family)?;
		Ok(predictions[0])
	}

	/// Run all six models on one sample and interpret the mean predicted index with the same thresholds used for labeling.
	pub fn predict_all(&self, sample: &Sample) -> Result<PredictAllOutput> {
		let mut classes = Vec::with_capacity(ModelFamily::ALL.len());
		let mut wqi = Vec::with_capacity(ModelFamily::ALL.len());
		for family in ModelFamily::ALL.iter() {
			classes.push((*family, self.predict_class(sample, *family)?));
			wqi.push((*family, self.predict_wqi(sample, *family)?));
		}
		let mean_wqi = wqi.iter().map(|(_, wqi)| wqi).sum::<f32>() / wqi.len() as f32;
		Ok(PredictAllOutput {
			classes,
			wqi,
			mean_wqi,
			interpretation: WaterQualityClass::from_wqi(mean_wqi),
		})
	}
}

fn read_optional<T>(dir: &Path, file_name: &str) -> Result<Option<model::Artifact<T>>>
where
	T: serde::de::DeserializeOwned,
{
	if dir.join(file_name).exists() {
		Ok(Some(model::read_artifact(dir, file_name)?))
	} else {
		Ok(None)
	}
}

fn missing_model_error(family: ModelFamily, task: TaskKind) -> anyhow::Error {
	format_err!(
		"no trained {} {} artifact found, run `waterline train` first",
		family,
		task.as_str()
	)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::clean::PARAMETER_COLUMNS;
	use crate::train::{train, FamilyOutcome};

	fn test_dir(name: &str) -> std::path::PathBuf {
		let dir = std::env::temp_dir().join(format!(
			"waterline_predict_test_{}_{}",
			name,
			std::process::id()
		));
		let _ = std::fs::remove_dir_all(&dir);
		std::fs::create_dir_all(&dir).unwrap();
		dir
	}

	fn parameter_values(kind: usize, row: usize) -> Vec<(&'static str, f32)> {
		let jitter = row as f32 * 0.01;
		match kind {
			// High index, "Safe/Potable".
			0 => vec![
				("DO (mg/L)", 6.5 + jitter),
				("pH", 7.0),
				("Conductivity (mS/cm)", 700.0),
				("BOD (mg/L)", 1.0),
				("COD (mg/L)", 5.0),
				("Nitrate", 5.0),
				("Nitrite-N (mg/L)", 0.05),
				("Fecal Coliform (MPN/100ml)", 2.0),
				("Total Coliform (MPN/100ml)", 10.0),
				("Turbidity (NTU)", 1.0),
				("Total Alk. (mg/L)", 150.0),
				("Chloride (mg/L)", 200.0),
				("TDS (mg/L)", 300.0),
				("TSS (mg/L)", 8.0),
				("Total Phosphate (mg/L)", 0.1),
				("Ammonia", 0.4),
				("Hardness (mg/L)", 100.0),
				("Fluoride (mg/L)", 1.0),
			],
			// Middle index, "Polluted".
			1 => vec![
				("DO (mg/L)", 4.0 + jitter),
				("pH", 6.6),
				("Conductivity (mS/cm)", 900.0),
				("BOD (mg/L)", 2.0),
				("COD (mg/L)", 8.0),
				("Nitrate", 20.0),
				("Nitrite-N (mg/L)", 0.2),
				("Fecal Coliform (MPN/100ml)", 8.0),
				("Total Coliform (MPN/100ml)", 40.0),
				("Turbidity (NTU)", 4.0),
				("Total Alk. (mg/L)", 180.0),
				("Chloride (mg/L)", 240.0),
				("TDS (mg/L)", 450.0),
				("TSS (mg/L)", 20.0),
				("Total Phosphate (mg/L)", 0.3),
				("Ammonia", 0.8),
				("Hardness (mg/L)", 250.0),
				("Fluoride (mg/L)", 1.2),
			],
			// Low index, "Highly Polluted".
			_ => vec![
				("DO (mg/L)", 0.5 + jitter),
				("pH", 9.5),
				("Conductivity (mS/cm)", 2500.0),
				("BOD (mg/L)", 50.0),
				("COD (mg/L)", 80.0),
				("Nitrate", 80.0),
				("Nitrite-N (mg/L)", 1.5),
				("Fecal Coliform (MPN/100ml)", 100.0),
				("Total Coliform (MPN/100ml)", 500.0),
				("Turbidity (NTU)", 50.0),
				("Total Alk. (mg/L)", 400.0),
				("Chloride (mg/L)", 900.0),
				("TDS (mg/L)", 2000.0),
				("TSS (mg/L)", 120.0),
				("Total Phosphate (mg/L)", 2.0),
				("Ammonia", 5.0),
				("Hardness (mg/L)", 900.0),
				("Fluoride (mg/L)", 3.0),
			],
		}
	}

	fn write_test_csv(dir: &std::path::Path) -> std::path::PathBuf {
		let mut csv = String::new();
		csv.push_str("Station code,water_bodies,Station name,");
		csv.push_str(&PARAMETER_COLUMNS.join(","));
		csv.push_str(",Remarks\n");
		for row in 0..36 {
			let kind = row % 3;
			let values = parameter_values(kind, row);
			assert_eq!(values.len(), PARAMETER_COLUMNS.len());
			let values: Vec<String> = PARAMETER_COLUMNS
				.iter()
				.map(|column| {
					let value = values
						.iter()
						.find(|(name, _)| name == column)
						.unwrap()
						.1;
					value.to_string()
				})
				.collect();
			csv.push_str(&format!("S{},lake,site,{},\n", row, values.join(",")));
		}
		let path = dir.join("measurements.csv");
		std::fs::write(&path, csv).unwrap();
		path
	}

	fn write_test_config(dir: &std::path::Path) -> std::path::PathBuf {
		let yaml = "forest:\n  n_trees: 10\n  max_depth: 6\nboosted:\n  n_rounds: 20\n  max_depth: 3\nnetwork:\n  max_epochs: 20\n  n_examples_per_batch: 16\n";
		let path = dir.join("config.yaml");
		std::fs::write(&path, yaml).unwrap();
		path
	}

	fn sample(kind: usize) -> Sample {
		parameter_values(kind, 0)
			.into_iter()
			.map(|(name, value)| (name.to_owned(), Some(value)))
			.collect()
	}

	fn train_test_bundle(name: &str) -> (std::path::PathBuf, std::path::PathBuf) {
		let dir = test_dir(name);
		let csv_path = write_test_csv(&dir);
		let config_path = write_test_config(&dir);
		let models_dir = dir.join("models");
		let report = train(&csv_path, Some(&config_path), &models_dir, &mut |_| {}).unwrap();
		for family in report.families.iter() {
			match &family.outcome {
				FamilyOutcome::Trained(_) => {}
				FamilyOutcome::Failed(message) => {
					panic!("family {} failed: {}", family.family, message)
				}
			}
		}
		assert_eq!(report.n_examples, 36);
		(dir, models_dir)
	}

	#[test]
	fn test_end_to_end_train_and_predict() {
		let (dir, models_dir) = train_test_bundle("end_to_end");
		let predictor = Predictor::load(&models_dir).unwrap();
		assert_eq!(predictor.feature_names().len(), PARAMETER_COLUMNS.len());
		// A sample identical to the clean training group scores high through the forest.
		let clean_sample = sample(0);
		let class = predictor
			.predict_class(&clean_sample, ModelFamily::Forest)
			.unwrap();
		assert_eq!(class, "Safe/Potable");
		let wqi = predictor
			.predict_wqi(&clean_sample, ModelFamily::Forest)
			.unwrap();
		assert!(wqi > 60.0);
		let output = predictor.predict_all(&clean_sample).unwrap();
		assert_eq!(output.classes.len(), 3);
		assert_eq!(output.wqi.len(), 3);
		for (_, class) in output.classes.iter() {
			assert!(predictor.classes().contains(class));
		}
		for (_, wqi) in output.wqi.iter() {
			assert!(wqi.is_finite());
		}
		assert!(output.mean_wqi.is_finite());
		assert_eq!(
			output.interpretation,
			WaterQualityClass::from_wqi(output.mean_wqi)
		);
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn test_missing_feature_is_an_error() {
		let (dir, models_dir) = train_test_bundle("missing_feature");
		let predictor = Predictor::load(&models_dir).unwrap();
		let mut sample = sample(0);
		sample.remove("pH");
		let error = predictor
			.predict_class(&sample, ModelFamily::Forest)
			.unwrap_err();
		assert!(error.to_string().contains("pH"));
		// A present key with no value is a missing measurement, which is imputed, not an error.
		let mut sample = self::sample(0);
		sample.insert("pH".to_owned(), None);
		assert!(predictor.predict_class(&sample, ModelFamily::Forest).is_ok());
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn test_load_without_bundle_says_train_first() {
		let dir = test_dir("no_bundle");
		let error = Predictor::load(&dir).unwrap_err();
		assert!(error.to_string().contains("train"));
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn test_mixed_run_ids_are_rejected() {
		let (dir, models_dir) = train_test_bundle("mixed_runs");
		// Rewrite the scaler with a different run id, as if it came from another training run.
		let scaler = crate::model::read_artifact::<StandardScaler>(
			&models_dir,
			crate::model::SCALER_FILE_NAME,
		)
		.unwrap();
		crate::model::write_artifact(
			&models_dir,
			crate::model::SCALER_FILE_NAME,
			Id::new(),
			&scaler.value,
		)
		.unwrap();
		let error = Predictor::load(&models_dir).unwrap_err();
		assert!(error.to_string().contains("different training runs"));
		let _ = std::fs::remove_dir_all(&dir);
	}
}
