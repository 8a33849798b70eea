/*!
This module defines the water quality index. Each parameter with a reference standard gets a sub index in [0, 100] describing how far the measured value sits from the ideal, and the index for a sample is the weighted mean of its computable sub indices.
*/

use std::fmt;

/// Selects which sub index formula applies to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
	/// The score falls off linearly with distance from the ideal, twice as fast outside the acceptable band. Only pH uses this curve.
	Banded,
	/// The ideal value is zero and the score falls off with value / max. Above the acceptable maximum the slope steepens from 100 to 150, which is an intentional penalty policy for contamination parameters.
	ZeroIdeal,
	/// The score falls off with distance from a nonzero ideal, relative to the acceptable maximum.
	Target,
}

/// The reference record for one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standard {
	pub ideal: f32,
	pub min: f32,
	pub max: f32,
	pub weight: f32,
	pub curve: Curve,
}

/// The full standards table. Constructed once at startup and passed by shared reference; parameters without an entry are excluded from the index.
#[derive(Debug, Clone)]
pub struct Standards {
	entries: Vec<(&'static str, Standard)>,
}

impl Standards {
	/// The WHO/BIS derived standards for the twelve scored parameters.
	pub fn reference() -> Self {
		fn standard(ideal: f32, min: f32, max: f32, weight: f32, curve: Curve) -> Standard {
			Standard {
				ideal,
				min,
				max,
				weight,
				curve,
			}
		}
		let entries = vec![
			("pH", standard(7.0, 6.5, 8.5, 4.0, Curve::Banded)),
			("DO (mg/L)", standard(6.0, 5.0, 14.0, 5.0, Curve::Target)),
			("BOD (mg/L)", standard(0.0, 0.0, 3.0, 5.0, Curve::ZeroIdeal)),
			("COD (mg/L)", standard(0.0, 0.0, 10.0, 4.0, Curve::ZeroIdeal)),
			("Nitrate", standard(0.0, 0.0, 45.0, 5.0, Curve::ZeroIdeal)),
			(
				"Total Coliform (MPN/100ml)",
				standard(0.0, 0.0, 50.0, 5.0, Curve::ZeroIdeal),
			),
			(
				"Fecal Coliform (MPN/100ml)",
				standard(0.0, 0.0, 10.0, 5.0, Curve::ZeroIdeal),
			),
			("TDS (mg/L)", standard(300.0, 0.0, 500.0, 4.0, Curve::Target)),
			("Turbidity (NTU)", standard(1.0, 0.0, 5.0, 3.0, Curve::Target)),
			("Chloride (mg/L)", standard(200.0, 0.0, 250.0, 3.0, Curve::Target)),
			("Hardness (mg/L)", standard(100.0, 0.0, 300.0, 2.0, Curve::Target)),
			("Fluoride (mg/L)", standard(1.0, 0.5, 1.5, 4.0, Curve::Target)),
		];
		Self { entries }
	}

	pub fn get(&self, parameter: &str) -> Option<&Standard> {
		self.entries
			.iter()
			.find(|(name, _)| *name == parameter)
			.map(|(_, standard)| standard)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Standard)> {
		self.entries.iter().map(|(name, standard)| (*name, standard))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Compute the sub index for one measured value against its standard. Missing values have no sub index and are excluded from aggregation rather than scored as zero.
pub fn sub_index(value: f32, standard: &Standard) -> Option<f32> {
	if !value.is_finite() {
		return None;
	}
	let score = match standard.curve {
		Curve::Banded => {
			if value >= standard.min && value <= standard.max {
				100.0 - (value - standard.ideal).abs() * 10.0
			} else {
				f32::max(0.0, 100.0 - (value - standard.ideal).abs() * 20.0)
			}
		}
		Curve::ZeroIdeal => {
			if value <= standard.max {
				100.0 - (value / standard.max) * 100.0
			} else {
				f32::max(0.0, 100.0 - (value / standard.max) * 150.0)
			}
		}
		Curve::Target => {
			if value <= standard.max {
				100.0 - (value - standard.ideal).abs() / standard.max * 100.0
			} else {
				f32::max(0.0, 100.0 - (value - standard.max) / standard.max * 100.0)
			}
		}
	};
	Some(score.max(0.0).min(100.0))
}

/// The weighted mean of the computable sub indices for one sample, or `None` when no parameter is computable.
pub fn wqi<'a>(
	values: impl IntoIterator<Item = (&'a str, f32)>,
	standards: &Standards,
) -> Option<f32> {
	let mut weighted_sum = 0.0;
	let mut weight_sum = 0.0;
	for (parameter, value) in values {
		if let Some(standard) = standards.get(parameter) {
			if let Some(score) = sub_index(value, standard) {
				weighted_sum += score * standard.weight;
				weight_sum += standard.weight;
			}
		}
	}
	if weight_sum == 0.0 {
		None
	} else {
		Some(weighted_sum / weight_sum)
	}
}

/// The three pollution classes, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WaterQualityClass {
	SafePotable,
	Polluted,
	HighlyPolluted,
}

impl WaterQualityClass {
	/// Thresholds are inclusive at the lower bound of each band.
	pub fn from_wqi(wqi: f32) -> Self {
		if wqi >= 70.0 {
			Self::SafePotable
		} else if wqi >= 40.0 {
			Self::Polluted
		} else {
			Self::HighlyPolluted
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::SafePotable => "Safe/Potable",
			Self::Polluted => "Polluted",
			Self::HighlyPolluted => "Highly Polluted",
		}
	}
}

impl fmt::Display for WaterQualityClass {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Lift `WaterQualityClass::from_wqi` over undefined indices.
pub fn classify(wqi: Option<f32>) -> Option<WaterQualityClass> {
	wqi.map(WaterQualityClass::from_wqi)
}

#[cfg(test)]
mod test {
	use super::*;

	fn standards() -> Standards {
		Standards::reference()
	}

	#[test]
	fn test_ph_sub_index_inside_band() {
		let standards = standards();
		let ph = standards.get("pH").unwrap();
		assert_eq!(sub_index(7.0, ph), Some(100.0));
		let score = sub_index(7.8, ph).unwrap();
		assert!((score - 92.0).abs() < 1e-4);
		assert_eq!(sub_index(6.5, ph), Some(95.0));
		assert_eq!(sub_index(8.5, ph), Some(85.0));
	}

	#[test]
	fn test_ph_sub_index_outside_band() {
		let standards = standards();
		let ph = standards.get("pH").unwrap();
		// Outside the acceptable band the slope doubles.
		assert_eq!(sub_index(9.0, ph), Some(100.0 - 2.0 * 20.0));
		assert_eq!(sub_index(1.0, ph), Some(0.0));
	}

	#[test]
	fn test_zero_ideal_boundary() {
		let standards = standards();
		let nitrate = standards.get("Nitrate").unwrap();
		assert_eq!(sub_index(45.0, nitrate), Some(0.0));
		// Just above the maximum the raw score goes negative and clamps to zero.
		assert_eq!(sub_index(46.0, nitrate), Some(0.0));
		assert_eq!(sub_index(0.0, nitrate), Some(100.0));
		assert_eq!(sub_index(22.5, nitrate), Some(50.0));
	}

	#[test]
	fn test_sub_index_missing_value() {
		let standards = standards();
		let nitrate = standards.get("Nitrate").unwrap();
		assert_eq!(sub_index(f32::NAN, nitrate), None);
	}

	#[test]
	fn test_sub_index_is_clamped() {
		let standards = standards();
		for (_, standard) in standards.iter() {
			for value in &[-1000.0, -1.0, 0.0, 0.1, 1.0, 10.0, 100.0, 1e6] {
				let score = sub_index(*value, standard).unwrap();
				assert!((0.0..=100.0).contains(&score));
			}
		}
	}

	#[test]
	fn test_wqi_undefined_without_computable_parameters() {
		let standards = standards();
		assert_eq!(wqi(Vec::new(), &standards), None);
		assert_eq!(wqi(vec![("TSS (mg/L)", 8.0)], &standards), None);
		assert_eq!(wqi(vec![("pH", f32::NAN)], &standards), None);
	}

	#[test]
	fn test_wqi_single_parameter() {
		let standards = standards();
		assert_eq!(wqi(vec![("pH", 7.0)], &standards), Some(100.0));
	}

	#[test]
	fn test_wqi_in_range() {
		let standards = standards();
		let values = vec![
			("pH", 12.0),
			("BOD (mg/L)", 80.0),
			("Nitrate", 500.0),
			("TDS (mg/L)", 9000.0),
		];
		let wqi = wqi(values, &standards).unwrap();
		assert!((0.0..=100.0).contains(&wqi));
	}

	#[test]
	fn test_wqi_example_sample_is_computable() {
		let standards = standards();
		let values = vec![
			("DO (mg/L)", 6.5),
			("pH", 7.8),
			("BOD (mg/L)", 2.5),
			("COD (mg/L)", 25.0),
			("Nitrate", 15.0),
			("Total Coliform (MPN/100ml)", 30.0),
			("Fecal Coliform (MPN/100ml)", 5.0),
			("TDS (mg/L)", 400.0),
			("Turbidity (NTU)", 4.0),
			("Chloride (mg/L)", 100.0),
			("Hardness (mg/L)", 200.0),
			("Fluoride (mg/L)", 0.8),
		];
		let wqi = wqi(values, &standards).unwrap();
		assert!((0.0..=100.0).contains(&wqi));
	}

	#[test]
	fn test_classify_boundaries() {
		assert_eq!(
			WaterQualityClass::from_wqi(70.0),
			WaterQualityClass::SafePotable
		);
		assert_eq!(
			WaterQualityClass::from_wqi(69.999),
			WaterQualityClass::Polluted
		);
		assert_eq!(WaterQualityClass::from_wqi(40.0), WaterQualityClass::Polluted);
		assert_eq!(
			WaterQualityClass::from_wqi(39.999),
			WaterQualityClass::HighlyPolluted
		);
	}

	#[test]
	fn test_classify_undefined() {
		assert_eq!(classify(None), None);
		assert_eq!(classify(Some(85.0)), Some(WaterQualityClass::SafePotable));
	}
}
