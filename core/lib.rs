/*!
Waterline computes a water quality index from raw lab measurements, labels each sample into one of three pollution classes, trains three model families to predict both, and serves predictions from the persisted bundle.
*/

pub mod clean;
pub mod config;
pub mod id;
pub mod model;
pub mod predict;
pub mod prepare;
pub mod progress;
pub mod train;
pub mod wqi;

pub use self::model::ModelFamily;
pub use self::predict::Predictor;
pub use self::train::train;
