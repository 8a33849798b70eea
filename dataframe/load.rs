use super::*;
use anyhow::Result;
use std::{collections::BTreeMap, path::Path};

#[derive(Clone)]
pub struct FromCsvOptions<'a> {
	/// Column types keyed by column name. Columns not present in the map are loaded as text.
	pub column_types: Option<BTreeMap<String, ColumnType>>,
	/// Values in number columns that should be treated as missing.
	pub invalid_values: &'a [&'a str],
}

impl<'a> Default for FromCsvOptions<'a> {
	fn default() -> Self {
		Self {
			column_types: None,
			invalid_values: DEFAULT_INVALID_VALUES,
		}
	}
}

/// These values are the default values that are considered invalid in number columns.
pub const DEFAULT_INVALID_VALUES: &[&str] = &[
	"", "null", "NULL", "n/a", "N/A", "nan", "-nan", "NaN", "-NaN", "?",
];

impl DataFrame {
	pub fn from_path(path: &Path, options: FromCsvOptions) -> Result<Self> {
		Self::from_csv(&mut csv::Reader::from_path(path)?, options)
	}

	pub fn from_csv<R>(reader: &mut csv::Reader<R>, options: FromCsvOptions) -> Result<Self>
	where
		R: std::io::Read,
	{
		let column_names: Vec<String> = reader
			.headers()?
			.into_iter()
			.map(|column_name| column_name.to_owned())
			.collect();
		let column_types: Vec<ColumnType> = column_names
			.iter()
			.map(|column_name| {
				options
					.column_types
					.as_ref()
					.and_then(|column_types| column_types.get(column_name))
					.cloned()
					.unwrap_or(ColumnType::Text)
			})
			.collect();
		let mut dataframe = Self::new(column_names, column_types);
		// Read each csv record and insert the values into the columns of the dataframe.
		let mut record = csv::ByteRecord::new();
		while reader.read_byte_record(&mut record)? {
			for (column, value) in dataframe.columns.iter_mut().zip(record.iter()) {
				match column {
					Column::Number(column) => {
						let value = match std::str::from_utf8(value) {
							Ok(value) if options.invalid_values.contains(&value) => f32::NAN,
							_ => match lexical::parse::<f32, &[u8]>(value) {
								Ok(value) if value.is_finite() => value,
								_ => f32::NAN,
							},
						};
						column.data.push(value);
					}
					Column::Text(column) => {
						column.data.push(std::str::from_utf8(value)?.to_owned())
					}
				}
			}
		}
		Ok(dataframe)
	}
}

#[cfg(test)]
fn test_options() -> FromCsvOptions<'static> {
	let mut column_types = BTreeMap::new();
	column_types.insert("value".to_owned(), ColumnType::Number);
	FromCsvOptions {
		column_types: Some(column_types),
		invalid_values: &["BDL", "NIL", ""],
	}
}

#[test]
fn test_from_csv() {
	let csv = "site,value\na,1.5\nb,BDL\nc,oops\nd,\n";
	let df = DataFrame::from_csv(
		&mut csv::Reader::from_reader(std::io::Cursor::new(csv)),
		test_options(),
	)
	.unwrap();
	assert_eq!(df.nrows(), 4);
	let site = df.column("site").unwrap().as_text().unwrap();
	assert_eq!(site.data[1], "b");
	let value = df.column("value").unwrap().as_number().unwrap();
	assert_eq!(value.data[0], 1.5);
	assert!(value.data[1].is_nan());
	assert!(value.data[2].is_nan());
	assert!(value.data[3].is_nan());
}

#[test]
fn test_from_csv_untyped_columns_are_text() {
	let csv = "site,value\na,1.5\n";
	let df = DataFrame::from_csv(
		&mut csv::Reader::from_reader(std::io::Cursor::new(csv)),
		FromCsvOptions::default(),
	)
	.unwrap();
	assert!(df.column("value").unwrap().as_text().is_some());
}
