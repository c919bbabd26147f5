#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Malformed stored value: {0}")]
	Malformed(String),
}

/// Any storage failure aborts the row mutation it was part of.
impl From<Error> for lexis_catalog::Error {
	fn from(err: Error) -> Self {
		Self::Transactional { message: err.to_string() }
	}
}
