//! Text normalization, weighted lexeme vectors, trigram sets, and lexeme queries.

mod error;
mod language;
mod normalize;
mod query;
mod trigram;
mod vector;

pub use error::{Error, Result};
pub use language::{Language, UnsupportedLanguage};
pub use normalize::{NormalizedText, Token, flatten_json, normalize};
pub use query::{QueryNode, QueryTerm, RankWeights, TextQuery};
pub use trigram::{TrigramSet, build_trigrams, trigrams_of};
pub use vector::{
	LexemeVector, MAX_LEXEME_BYTES, VectorOptions, Weight, WeightedPosition, build_vector,
};
