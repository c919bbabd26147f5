use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ArtifactKey, Result, SearchArtifact};

/// One artifact write the host must apply inside the mutating transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ArtifactChange {
	/// Insert, or replace the whole artifact in place.
	Upsert { artifact: SearchArtifact },
	/// Remove the artifact. Removing an absent artifact is not an error.
	Delete { schema: String, key: ArtifactKey },
	/// Remove every artifact of one projection.
	Purge { schema: String, definition_id: Uuid },
}

/// Artifact store the host mutates inside its own transaction.
pub trait ArtifactWriter {
	fn upsert(&mut self, artifact: &SearchArtifact) -> Result<()>;

	fn delete(&mut self, schema: &str, key: &ArtifactKey) -> Result<()>;

	fn purge(&mut self, schema: &str, definition_id: Uuid) -> Result<()>;
}

/// Changes produced by one row mutation, in application order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
	changes: Vec<ArtifactChange>,
}
impl ChangeSet {
	pub fn is_empty(&self) -> bool {
		self.changes.is_empty()
	}

	pub fn len(&self) -> usize {
		self.changes.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &ArtifactChange> {
		self.changes.iter()
	}

	pub fn push(&mut self, change: ArtifactChange) {
		self.changes.push(change);
	}

	pub fn extend(&mut self, other: ChangeSet) {
		self.changes.extend(other.changes);
	}

	/// Upserted artifacts, in order.
	pub fn upserts(&self) -> impl Iterator<Item = &SearchArtifact> {
		self.changes.iter().filter_map(|change| match change {
			ArtifactChange::Upsert { artifact } => Some(artifact),
			_ => None,
		})
	}

	/// Stops at the first rejected write. The caller must then abort its transaction.
	pub fn apply<W>(&self, writer: &mut W) -> Result<()>
	where
		W: ArtifactWriter + ?Sized,
	{
		for change in &self.changes {
			match change {
				ArtifactChange::Upsert { artifact } => writer.upsert(artifact)?,
				ArtifactChange::Delete { schema, key } => writer.delete(schema, key)?,
				ArtifactChange::Purge { schema, definition_id } =>
					writer.purge(schema, *definition_id)?,
			}
		}

		Ok(())
	}
}
impl From<Vec<ArtifactChange>> for ChangeSet {
	fn from(changes: Vec<ArtifactChange>) -> Self {
		Self { changes }
	}
}
impl IntoIterator for ChangeSet {
	type IntoIter = std::vec::IntoIter<ArtifactChange>;
	type Item = ArtifactChange;

	fn into_iter(self) -> Self::IntoIter {
		self.changes.into_iter()
	}
}
