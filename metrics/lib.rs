/*!
This crate defines the [`StreamingMetric`](trait.StreamingMetric.html) trait and the concrete metrics the training pipeline reports, such as [`Accuracy`](struct.Accuracy.html) and [`RegressionMetrics`](struct.RegressionMetrics.html).
*/

mod accuracy;
mod mean;
mod mean_variance;
mod regression;

pub use self::accuracy::Accuracy;
pub use self::mean::Mean;
pub use self::mean_variance::{m2_to_variance, merge_mean_m2, MeanVariance};
pub use self::regression::{RegressionMetrics, RegressionMetricsInput, RegressionMetricsOutput};

/**
The `StreamingMetric` trait defines a common interface to metrics that can be computed in a streaming manner, where the input is available in chunks.

After being initialized, a value of a type implementing `StreamingMetric` can have `update()` called on it with values of the associated type `Input`. Multiple values can be combined by calling `merge()`. When finished aggregating, call `finalize()` to produce the associated type `Output`.

The seemingly unused generic lifetime `'a` exists here to allow `Input`s and `Output`s to borrow from their enclosing scope.
*/
pub trait StreamingMetric<'a> {
	/// `Input` is the type to aggregate in calls to `update()`.
	type Input;
	/// `Output` is the return type of `finalize()`.
	type Output;
	/// Update this streaming metric with the `Input` `input`.
	fn update(&mut self, input: Self::Input);
	/// Merge multiple independently computed streaming metrics.
	fn merge(&mut self, other: Self);
	/// When you are done aggregating `Input`s, call `finalize()` to produce an `Output`.
	fn finalize(self) -> Self::Output;
}
