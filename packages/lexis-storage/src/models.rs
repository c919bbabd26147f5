use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result};
use lexis_catalog::{ArtifactKey, IndexSpec, SearchArtifact, SearchHit};
use lexis_text::{Language, LexemeVector, Weight};

#[derive(Debug, sqlx::FromRow)]
pub struct StoredDefinition {
	pub definition_id: Uuid,
	pub table_name: String,
	pub spec: Value,
	pub created_at: OffsetDateTime,
}
impl StoredDefinition {
	pub fn to_spec(&self) -> Result<IndexSpec> {
		let spec: IndexSpec = serde_json::from_value(self.spec.clone()).map_err(|err| {
			Error::Malformed(format!("Definition {} does not decode: {err}.", self.definition_id))
		})?;

		if spec.definition_id != self.definition_id {
			return Err(Error::Malformed(format!(
				"Definition {} carries the id {}.",
				self.definition_id, spec.definition_id
			)));
		}

		Ok(spec)
	}
}

/// One `searchables` row. The vector comes back in its canonical text form.
#[derive(Debug, sqlx::FromRow)]
pub struct StoredArtifact {
	pub definition_id: Uuid,
	pub table_name: String,
	pub primary_key_value: String,
	pub text: String,
	pub language: String,
	pub weight: String,
	pub vectors: String,
	pub trigrams: Vec<String>,
	pub fingerprint: String,
	pub updated_at: OffsetDateTime,
}
impl StoredArtifact {
	pub fn into_artifact(self, schema: &str) -> Result<SearchArtifact> {
		let malformed = |what: &str, err: &dyn std::fmt::Display| {
			Error::Malformed(format!(
				"Artifact {}/{} has a bad {what}: {err}.",
				self.table_name, self.primary_key_value
			))
		};
		let language: Language =
			self.language.parse().map_err(|err| malformed("language", &err))?;
		let weight: Weight = self.weight.trim().parse().map_err(|err| malformed("weight", &err))?;
		let vector: LexemeVector =
			self.vectors.parse().map_err(|err| malformed("vector", &err))?;

		Ok(SearchArtifact {
			key: ArtifactKey {
				definition_id: self.definition_id,
				table: self.table_name,
				primary_key: self.primary_key_value,
			},
			schema: schema.to_string(),
			text: self.text,
			language,
			weight,
			vector,
			trigrams: self.trigrams.into_iter().collect(),
			fingerprint: self.fingerprint,
			updated_at: self.updated_at,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct ScoredRow {
	pub definition_id: Uuid,
	pub table_name: String,
	pub primary_key_value: String,
	pub score: f32,
}
impl From<ScoredRow> for SearchHit {
	fn from(row: ScoredRow) -> Self {
		Self {
			key: ArtifactKey {
				definition_id: row.definition_id,
				table: row.table_name,
				primary_key: row.primary_key_value,
			},
			score: row.score,
		}
	}
}
