use crate::model::ModelFamily;

/// Training reports its progress through a callback taking these values.
#[derive(Debug, Clone, Copy)]
pub enum Progress {
	Loading,
	Scoring,
	Training(ModelFamily),
	Testing(ModelFamily),
}
