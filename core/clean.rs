/*!
This module turns a raw measurements csv into a typed dataframe the rest of the pipeline can use. Rows whose remark marks the sample as invalid are dropped first, then the columns are projected down to the metadata plus the recognized parameters, and finally rows with too few measured parameters are dropped.
*/

use anyhow::{format_err, Result};
use std::collections::BTreeMap;
use std::path::Path;
use waterline_dataframe::{Column, ColumnType, DataFrame, FromCsvOptions};

pub const METADATA_COLUMNS: &[&str] = &["Station code", "water_bodies", "Station name"];

pub const REMARKS_COLUMN: &str = "Remarks";

/// The recognized measurement parameters, in canonical order. Columns outside this list and the metadata are dropped during cleaning.
pub const PARAMETER_COLUMNS: &[&str] = &[
	"DO (mg/L)",
	"pH",
	"Conductivity (mS/cm)",
	"BOD (mg/L)",
	"COD (mg/L)",
	"Nitrate",
	"Nitrite-N (mg/L)",
	"Fecal Coliform (MPN/100ml)",
	"Total Coliform (MPN/100ml)",
	"Turbidity (NTU)",
	"Total Alk. (mg/L)",
	"Chloride (mg/L)",
	"TDS (mg/L)",
	"TSS (mg/L)",
	"Total Phosphate (mg/L)",
	"Ammonia",
	"Hardness (mg/L)",
	"Fluoride (mg/L)",
];

/// A row whose remark contains any of these, case insensitively, is not a usable sample.
const REJECT_REMARKS: &[&str] = &[
	"dried up",
	"lake emptied",
	"under renovation",
	"not collected",
	"no access",
	"lake covered",
];

/// Tokens labs use for unmeasured values. They become missing, not zero.
const MISSING_SENTINELS: &[&str] = &["BDL", "Less than 1.8", "NIL", ""];

/// A row must have at least this many measured parameters to be kept.
fn min_parameters_present() -> usize {
	// Half of the recognized parameter list, regardless of how many parameter columns the input has.
	(PARAMETER_COLUMNS.len() as f32 * 0.5).ceil() as usize
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanSummary {
	pub n_rows_read: usize,
	pub n_dropped_by_remark: usize,
	pub n_dropped_sparse: usize,
	pub n_rows: usize,
}

pub fn load_and_clean(path: &Path) -> Result<(DataFrame, CleanSummary)> {
	let mut column_types = BTreeMap::new();
	for parameter in PARAMETER_COLUMNS {
		column_types.insert((*parameter).to_owned(), ColumnType::Number);
	}
	let dataframe = DataFrame::from_path(
		path,
		FromCsvOptions {
			column_types: Some(column_types),
			invalid_values: MISSING_SENTINELS,
		},
	)?;
	clean(dataframe)
}

pub fn clean(mut dataframe: DataFrame) -> Result<(DataFrame, CleanSummary)> {
	let n_rows_read = dataframe.nrows();
	// Drop rows whose remark matches a rejection keyword. This happens before projection so the remarks column is still present, and before the sparsity threshold so rejected rows never count.
	let keep: Vec<bool> = dataframe
		.column(REMARKS_COLUMN)
		.and_then(Column::as_text)
		.ok_or_else(|| format_err!("did not find a \"{}\" column", REMARKS_COLUMN))?
		.data
		.iter()
		.map(|remark| {
			let remark = remark.to_lowercase();
			!REJECT_REMARKS
				.iter()
				.any(|keyword| remark.contains(keyword))
		})
		.collect();
	dataframe.retain_rows(&keep);
	let n_dropped_by_remark = n_rows_read - dataframe.nrows();
	// Project to the metadata columns plus the recognized parameter columns present in the input.
	let column_names: Vec<&str> = METADATA_COLUMNS
		.iter()
		.chain(PARAMETER_COLUMNS.iter())
		.cloned()
		.filter(|column_name| dataframe.column(column_name).is_some())
		.collect();
	if !column_names
		.iter()
		.any(|column_name| PARAMETER_COLUMNS.contains(column_name))
	{
		return Err(format_err!(
			"did not find any recognized parameter columns in the input"
		));
	}
	let mut dataframe = dataframe.select(&column_names)?;
	// Drop rows with fewer measured parameters than the threshold.
	let n_before_sparse = dataframe.nrows();
	let parameter_columns: Vec<&Column> = dataframe
		.columns
		.iter()
		.filter(|column| PARAMETER_COLUMNS.contains(&column.name()))
		.collect();
	let min_present = min_parameters_present();
	let keep: Vec<bool> = (0..dataframe.nrows())
		.map(|row_index| {
			let n_present = parameter_columns
				.iter()
				.filter(|column| {
					column
						.as_number()
						.map(|column| column.data[row_index].is_finite())
						.unwrap_or(false)
				})
				.count();
			n_present >= min_present
		})
		.collect();
	drop(parameter_columns);
	dataframe.retain_rows(&keep);
	let n_dropped_sparse = n_before_sparse - dataframe.nrows();
	let summary = CleanSummary {
		n_rows_read,
		n_dropped_by_remark,
		n_dropped_sparse,
		n_rows: dataframe.nrows(),
	};
	Ok((dataframe, summary))
}

#[cfg(test)]
mod test {
	use super::*;

	fn test_csv(rows: &[&str]) -> DataFrame {
		let mut csv = String::new();
		let parameters = PARAMETER_COLUMNS.join(",");
		csv.push_str(&format!("Station code,water_bodies,Station name,{},Remarks\n", parameters));
		for row in rows {
			csv.push_str(row);
			csv.push('\n');
		}
		let mut column_types = BTreeMap::new();
		for parameter in PARAMETER_COLUMNS {
			column_types.insert((*parameter).to_owned(), ColumnType::Number);
		}
		DataFrame::from_csv(
			&mut csv::Reader::from_reader(std::io::Cursor::new(csv)),
			FromCsvOptions {
				column_types: Some(column_types),
				invalid_values: MISSING_SENTINELS,
			},
		)
		.unwrap()
	}

	fn full_row(station: &str, remark: &str) -> String {
		let values: Vec<String> = (0..PARAMETER_COLUMNS.len())
			.map(|i| (i + 1).to_string())
			.collect();
		format!("{},lake,site,{},{}", station, values.join(","), remark)
	}

	fn sparse_row(station: &str, n_values: usize) -> String {
		let values: Vec<String> = (0..PARAMETER_COLUMNS.len())
			.map(|i| {
				if i < n_values {
					(i + 1).to_string()
				} else {
					"BDL".to_owned()
				}
			})
			.collect();
		format!("{},lake,site,{},", station, values.join(","))
	}

	#[test]
	fn test_remark_filter_is_case_insensitive() {
		let dataframe = test_csv(&[
			&full_row("S1", "ok"),
			&full_row("S2", "Lake Covered by weeds"),
			&full_row("S3", "DRIED UP in summer"),
			&full_row("S4", ""),
		]);
		let (cleaned, summary) = clean(dataframe).unwrap();
		assert_eq!(summary.n_rows_read, 4);
		assert_eq!(summary.n_dropped_by_remark, 2);
		assert_eq!(cleaned.nrows(), 2);
		let stations = cleaned.column("Station code").unwrap().as_text().unwrap();
		assert_eq!(stations.data, vec!["S1".to_owned(), "S4".to_owned()]);
	}

	#[test]
	fn test_sentinels_become_missing() {
		let dataframe = test_csv(&[&sparse_row("S1", 9)]);
		let (cleaned, _) = clean(dataframe).unwrap();
		let do_column = cleaned.column("DO (mg/L)").unwrap().as_number().unwrap();
		assert_eq!(do_column.data[0], 1.0);
		let fluoride_column = cleaned
			.column("Fluoride (mg/L)")
			.unwrap()
			.as_number()
			.unwrap();
		assert!(fluoride_column.data[0].is_nan());
	}

	#[test]
	fn test_sparse_rows_are_dropped() {
		// 9 of 18 parameters is enough, 8 is not.
		let dataframe = test_csv(&[&sparse_row("S1", 9), &sparse_row("S2", 8)]);
		let (cleaned, summary) = clean(dataframe).unwrap();
		assert_eq!(summary.n_dropped_sparse, 1);
		assert_eq!(cleaned.nrows(), 1);
		let stations = cleaned.column("Station code").unwrap().as_text().unwrap();
		assert_eq!(stations.data, vec!["S1".to_owned()]);
	}

	#[test]
	fn test_remarks_column_is_projected_away() {
		let dataframe = test_csv(&[&full_row("S1", "ok")]);
		let (cleaned, _) = clean(dataframe).unwrap();
		assert!(cleaned.column(REMARKS_COLUMN).is_none());
		assert!(cleaned.column("Station code").is_some());
		assert!(cleaned.column("pH").is_some());
	}

	#[test]
	fn test_missing_remarks_column_is_an_error() {
		let csv = "Station code,pH\nS1,7.0\n";
		let mut column_types = BTreeMap::new();
		column_types.insert("pH".to_owned(), ColumnType::Number);
		let dataframe = DataFrame::from_csv(
			&mut csv::Reader::from_reader(std::io::Cursor::new(csv)),
			FromCsvOptions {
				column_types: Some(column_types),
				invalid_values: MISSING_SENTINELS,
			},
		)
		.unwrap();
		assert!(clean(dataframe).is_err());
	}
}
