use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{IndexSpec, Result, SourceRow, extract};
use lexis_config::{Config, FlattenMode, TrigramPadding};
use lexis_text::{
	Language, LexemeVector, TrigramSet, VectorOptions, Weight, build_trigrams, build_vector,
	normalize,
};

/// Identity of one artifact: one projection of one row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
	pub definition_id: Uuid,
	pub table: String,
	pub primary_key: String,
}
impl ArtifactKey {
	pub fn new(spec: &IndexSpec, primary_key: &str) -> Self {
		Self {
			definition_id: spec.definition_id,
			table: spec.table.clone(),
			primary_key: primary_key.to_string(),
		}
	}
}

/// Derived search representation of one row under one projection.
///
/// Vector and trigram set are always written together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchArtifact {
	pub key: ArtifactKey,
	pub schema: String,
	/// Extracted text before normalization.
	pub text: String,
	pub language: Language,
	pub weight: Weight,
	pub vector: LexemeVector,
	pub trigrams: TrigramSet,
	/// Hex BLAKE3 digest of everything above except the key and schema.
	pub fingerprint: String,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}

/// Process-wide knobs for turning extracted text into artifacts.
#[derive(Clone, Debug)]
pub struct Pipeline {
	pub flatten: FlattenMode,
	pub max_json_depth: u32,
	pub vector: VectorOptions,
	pub padding: TrigramPadding,
}
impl Pipeline {
	pub fn from_config(cfg: &Config) -> Self {
		Self {
			flatten: cfg.engine.flatten,
			max_json_depth: cfg.engine.max_json_depth,
			vector: VectorOptions::from(&cfg.vector),
			padding: cfg.trigram.padding,
		}
	}

	/// Recomputes the artifact of `row` from scratch. `Ok(None)` means not applicable.
	pub fn build(&self, spec: &IndexSpec, row: &SourceRow) -> Result<Option<SearchArtifact>> {
		let extracted =
			extract::evaluate(&spec.expression, row, self.flatten, self.max_json_depth)?;
		let Some(text) = extracted else { return Ok(None) };
		let language = extract::resolve_language(&spec.language, row);
		let normalized = normalize(&text, language);
		let vector = build_vector(&normalized, spec.weight, &self.vector);
		let trigrams = build_trigrams(&normalized, self.padding);
		let fingerprint = fingerprint(&text, language, spec.weight, &vector, &trigrams);

		Ok(Some(SearchArtifact {
			key: ArtifactKey::new(spec, &row.primary_key),
			schema: spec.schema.clone(),
			text,
			language,
			weight: spec.weight,
			vector,
			trigrams,
			fingerprint,
			updated_at: OffsetDateTime::now_utc(),
		}))
	}
}
impl Default for Pipeline {
	fn default() -> Self {
		Self::from_config(&Config::default())
	}
}

fn fingerprint(
	text: &str,
	language: Language,
	weight: Weight,
	vector: &LexemeVector,
	trigrams: &TrigramSet,
) -> String {
	let weight = weight.to_string();
	let vector = vector.to_string();
	let trigrams = trigrams.to_string();
	let mut hasher = blake3::Hasher::new();

	for part in [text, language.as_str(), weight.as_str(), vector.as_str(), trigrams.as_str()] {
		hasher.update(&(part.len() as u64).to_le_bytes());
		hasher.update(part.as_bytes());
	}

	hasher.finalize().to_hex().to_string()
}
