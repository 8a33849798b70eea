//! This module contains the main entrypoint to the waterline cli.

use anyhow::{Context, Result};
use clap::Clap;
use colored::Colorize;
use std::path::{Path, PathBuf};
use waterline_core::model::ModelFamily;
use waterline_core::predict::{Predictor, Sample};
use waterline_core::progress::Progress;
use waterline_core::train::{train, FamilyOutcome, TrainReport};
use waterline_core::wqi::WaterQualityClass;

#[derive(Clap)]
#[clap(
	about = "Score water samples and train models that predict their quality.",
	setting = clap::AppSettings::DisableHelpSubcommand,
)]
enum Options {
	#[clap(name = "train")]
	Train(Box<TrainOptions>),
	#[clap(name = "predict")]
	Predict(Box<PredictOptions>),
}

#[derive(Clap, Debug)]
#[clap(about = "train models from a measurements csv")]
struct TrainOptions {
	#[clap(short, long, about = "the path to your measurements .csv file")]
	file: PathBuf,
	#[clap(
		short,
		long,
		about = "the directory to write the model bundle to",
		default_value = "models"
	)]
	output: PathBuf,
	#[clap(short, long, about = "the path to a config file")]
	config: Option<PathBuf>,
}

#[derive(Clap, Debug)]
#[clap(about = "predict water quality for a sample")]
struct PredictOptions {
	#[clap(
		short,
		long,
		about = "the directory containing the trained model bundle",
		default_value = "models"
	)]
	models: PathBuf,
	#[clap(
		short,
		long,
		about = "the path to a json file mapping parameter names to values, defaults to a built in example sample"
	)]
	file: Option<PathBuf>,
	#[clap(long, about = "the model family to use, one of forest, boosted, or network")]
	model: Option<String>,
}

fn main() {
	let options = Options::parse();
	let result = match options {
		Options::Train(options) => cli_train(*options),
		Options::Predict(options) => cli_predict(*options),
	};
	if let Err(error) = result {
		eprintln!("{}: {}", "error".red().bold(), error);
		std::process::exit(1);
	}
}

fn cli_train(options: TrainOptions) -> Result<()> {
	let report = train(
		&options.file,
		options.config.as_deref(),
		&options.output,
		&mut |progress| match progress {
			Progress::Loading => eprintln!("loading and cleaning the measurements"),
			Progress::Scoring => eprintln!("computing the water quality index"),
			Progress::Training(family) => eprintln!("training {} models", family),
			Progress::Testing(family) => eprintln!("testing {} models", family),
		},
	)?;
	print_report(&report, &options.output);
	Ok(())
}

fn print_report(report: &TrainReport, output: &Path) {
	eprintln!();
	eprintln!(
		"{} rows read, {} dropped by remark, {} dropped as too sparse, {} labeled samples",
		report.clean_summary.n_rows_read,
		report.clean_summary.n_dropped_by_remark,
		report.clean_summary.n_dropped_sparse,
		report.n_examples,
	);
	eprintln!(
		"mean wqi {:.2}, {} training examples, {} test examples",
		report.mean_wqi, report.n_train, report.n_test
	);
	eprintln!("class distribution:");
	for (class, count) in report.class_distribution.iter() {
		eprintln!("  {:16} {}", class, count);
	}
	eprintln!("test metrics:");
	for family in report.families.iter() {
		match &family.outcome {
			FamilyOutcome::Trained(metrics) => eprintln!(
				"  {:8} accuracy {:.4}, r2 {:.4}, rmse {:.4}",
				family.family.as_str(),
				metrics.accuracy,
				metrics.r2,
				metrics.rmse
			),
			FamilyOutcome::Failed(message) => eprintln!(
				"  {:8} {}: {}",
				family.family.as_str(),
				"failed".red(),
				message
			),
		}
	}
	eprintln!();
	eprintln!("Your model bundle was written to {}.", output.display());
	eprintln!("Run `waterline predict` to score a sample with it.");
}

fn cli_predict(options: PredictOptions) -> Result<()> {
	let sample: Sample = match &options.file {
		Some(path) => {
			let json = std::fs::read_to_string(path)
				.with_context(|| format!("failed to read {}", path.display()))?;
			serde_json::from_str(&json)
				.with_context(|| format!("failed to parse {}", path.display()))?
		}
		None => example_sample(),
	};
	let predictor = Predictor::load(&options.models)?;
	match &options.model {
		Some(model) => {
			let family: ModelFamily = model.parse()?;
			let class = predictor.predict_class(&sample, family)?;
			let wqi = predictor.predict_wqi(&sample, family)?;
			println!("{:8} class {}, wqi {:.2}", family.as_str(), class, wqi);
		}
		None => {
			let output = predictor.predict_all(&sample)?;
			println!("classification:");
			for (family, class) in output.classes.iter() {
				println!("  {:8} {}", family.as_str(), class);
			}
			println!("wqi prediction:");
			for (family, wqi) in output.wqi.iter() {
				println!("  {:8} {:.2}", family.as_str(), wqi);
			}
			println!("mean wqi: {:.2}", output.mean_wqi);
			println!("interpretation: {}", output.interpretation);
			println!("{}", interpretation_advice(output.interpretation));
		}
	}
	Ok(())
}

fn interpretation_advice(interpretation: WaterQualityClass) -> &'static str {
	match interpretation {
		WaterQualityClass::SafePotable => {
			"The water meets quality standards for drinking and domestic use."
		}
		WaterQualityClass::Polluted => {
			"The water shows moderate pollution. Treatment is recommended."
		}
		WaterQualityClass::HighlyPolluted => {
			"The water is severely polluted. It is not suitable for use."
		}
	}
}

/// An example sample, used when `predict` is run without a file.
fn example_sample() -> Sample {
	vec![
		("DO (mg/L)", 6.5),
		("pH", 7.8),
		("Conductivity (mS/cm)", 700.0),
		("BOD (mg/L)", 2.5),
		("COD (mg/L)", 25.0),
		("Nitrate", 15.0),
		("Nitrite-N (mg/L)", 0.05),
		("Fecal Coliform (MPN/100ml)", 5.0),
		("Total Coliform (MPN/100ml)", 30.0),
		("Turbidity (NTU)", 4.0),
		("Total Alk. (mg/L)", 150.0),
		("Chloride (mg/L)", 100.0),
		("TDS (mg/L)", 400.0),
		("TSS (mg/L)", 8.0),
		("Total Phosphate (mg/L)", 0.1),
		("Ammonia", 0.4),
		("Hardness (mg/L)", 200.0),
		("Fluoride (mg/L)", 0.8),
	]
	.into_iter()
	.map(|(name, value)| (name.to_owned(), Some(value)))
	.collect()
}
