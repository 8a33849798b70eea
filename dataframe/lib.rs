/*!
This crate provides a basic implementation of dataframes, which are two dimensional arrays of data where each column can have a different data type. It implements only the features needed to support Waterline: number columns that represent missing values as NaN, text columns, and loading both from csv files.
*/

use anyhow::{format_err, Result};
use ndarray::prelude::*;

pub mod load;

pub use self::load::*;

#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
	pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
	Number(NumberColumn),
	Text(TextColumn),
}

/// A column of f32 values where missing or invalid values are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumn {
	pub name: String,
	pub data: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextColumn {
	pub name: String,
	pub data: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
	Number,
	Text,
}

impl DataFrame {
	pub fn new(column_names: Vec<String>, column_types: Vec<ColumnType>) -> Self {
		let columns = column_names
			.into_iter()
			.zip(column_types.into_iter())
			.map(|(column_name, column_type)| match column_type {
				ColumnType::Number => Column::Number(NumberColumn::new(column_name)),
				ColumnType::Text => Column::Text(TextColumn::new(column_name)),
			})
			.collect();
		Self { columns }
	}

	pub fn ncols(&self) -> usize {
		self.columns.len()
	}

	pub fn nrows(&self) -> usize {
		self.columns.first().map(|column| column.len()).unwrap_or(0)
	}

	pub fn column(&self, name: &str) -> Option<&Column> {
		self.columns.iter().find(|column| column.name() == name)
	}

	/// Return a new dataframe with the named columns in the given order.
	pub fn select(&self, column_names: &[&str]) -> Result<Self> {
		let columns = column_names
			.iter()
			.map(|column_name| {
				self.column(column_name)
					.cloned()
					.ok_or_else(|| format_err!("did not find column \"{}\"", column_name))
			})
			.collect::<Result<Vec<_>>>()?;
		Ok(Self { columns })
	}

	/// Keep only the rows whose entry in `keep` is true. `keep` must have one entry per row.
	pub fn retain_rows(&mut self, keep: &[bool]) {
		assert_eq!(keep.len(), self.nrows());
		for column in self.columns.iter_mut() {
			match column {
				Column::Number(column) => {
					let mut iter = keep.iter();
					column.data.retain(|_| *iter.next().unwrap());
				}
				Column::Text(column) => {
					let mut iter = keep.iter();
					column.data.retain(|_| *iter.next().unwrap());
				}
			}
		}
	}

	/// Collect the number columns into an (nrows, ncols) f32 array. Returns None if any column is not a number column.
	pub fn to_rows_f32(&self) -> Option<Array2<f32>> {
		let mut rows = Array2::zeros((self.nrows(), self.ncols()));
		for (mut array_column, dataframe_column) in rows
			.axis_iter_mut(Axis(1))
			.zip(self.columns.iter())
		{
			match dataframe_column {
				Column::Number(column) => {
					for (a, b) in array_column.iter_mut().zip(column.data.iter()) {
						*a = *b;
					}
				}
				Column::Text(_) => return None,
			}
		}
		Some(rows)
	}
}

impl Column {
	pub fn len(&self) -> usize {
		match self {
			Self::Number(s) => s.data.len(),
			Self::Text(s) => s.data.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		match self {
			Self::Number(s) => s.data.is_empty(),
			Self::Text(s) => s.data.is_empty(),
		}
	}

	pub fn name(&self) -> &str {
		match self {
			Self::Number(s) => s.name.as_str(),
			Self::Text(s) => s.name.as_str(),
		}
	}

	pub fn as_number(&self) -> Option<&NumberColumn> {
		match self {
			Self::Number(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_text(&self) -> Option<&TextColumn> {
		match self {
			Self::Text(s) => Some(s),
			_ => None,
		}
	}
}

impl NumberColumn {
	pub fn new(name: String) -> Self {
		Self {
			name,
			data: Vec::new(),
		}
	}
}

impl TextColumn {
	pub fn new(name: String) -> Self {
		Self {
			name,
			data: Vec::new(),
		}
	}
}

#[test]
fn test_select_and_retain() {
	let mut df = DataFrame {
		columns: vec![
			Column::Number(NumberColumn {
				name: "a".to_owned(),
				data: vec![1.0, 2.0, 3.0],
			}),
			Column::Text(TextColumn {
				name: "b".to_owned(),
				data: vec!["x".to_owned(), "y".to_owned(), "z".to_owned()],
			}),
		],
	};
	df.retain_rows(&[true, false, true]);
	assert_eq!(df.nrows(), 2);
	assert_eq!(df.column("a").unwrap().as_number().unwrap().data, vec![1.0, 3.0]);
	let selected = df.select(&["b"]).unwrap();
	assert_eq!(selected.ncols(), 1);
	assert_eq!(
		selected.column("b").unwrap().as_text().unwrap().data,
		vec!["x".to_owned(), "z".to_owned()]
	);
	assert!(df.select(&["missing"]).is_err());
}

#[test]
fn test_to_rows_f32() {
	let df = DataFrame {
		columns: vec![
			Column::Number(NumberColumn {
				name: "a".to_owned(),
				data: vec![1.0, 2.0],
			}),
			Column::Number(NumberColumn {
				name: "b".to_owned(),
				data: vec![3.0, 4.0],
			}),
		],
	};
	let rows = df.to_rows_f32().unwrap();
	assert_eq!(rows.shape(), &[2, 2]);
	assert_eq!(rows[[0, 1]], 3.0);
	assert_eq!(rows[[1, 0]], 2.0);
}
