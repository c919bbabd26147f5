pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A projection cannot be registered as declared.
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	/// A registered expression cannot be evaluated against one row.
	#[error("Extraction error: {message}")]
	Extraction { message: String },
	/// The host store rejected an artifact write. Aborts the enclosing mutation.
	#[error("Transactional failure: {message}")]
	Transactional { message: String },
}
impl From<lexis_text::Error> for Error {
	fn from(err: lexis_text::Error) -> Self {
		Self::Extraction { message: err.to_string() }
	}
}
