pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Structured value is nested deeper than {max_depth} levels.")]
	JsonTooDeep { max_depth: u32 },
	#[error("Invalid lexeme vector: {message}")]
	VectorSyntax { message: String },
	#[error("Invalid trigram set: {message}")]
	TrigramSyntax { message: String },
	#[error("Invalid text query: {message}")]
	QuerySyntax { message: String },
}
