use std::{
	collections::BTreeMap,
	sync::{RwLock, RwLockReadGuard},
};

use uuid::Uuid;

use crate::{ArtifactChange, ArtifactKey, ArtifactWriter, ChangeSet, Result, SearchArtifact};
use lexis_config::TrigramPadding;
use lexis_text::{RankWeights, TextQuery, trigrams_of};

#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
	pub key: ArtifactKey,
	pub score: f32,
}

/// Reference artifact store with transactional writes.
///
/// Readers see either all of a committed transaction or none of it.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
	artifacts: RwLock<BTreeMap<ArtifactKey, SearchArtifact>>,
}
impl MemoryCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts staging writes. Dropping the transaction without committing discards them.
	pub fn begin(&self) -> CatalogTransaction<'_> {
		CatalogTransaction { catalog: self, staged: Vec::new() }
	}

	/// Applies `changes` as one transaction.
	pub fn apply(&self, changes: &ChangeSet) -> Result<()> {
		let mut tx = self.begin();

		changes.apply(&mut tx)?;
		tx.commit();

		Ok(())
	}

	pub fn get(&self, key: &ArtifactKey) -> Option<SearchArtifact> {
		self.read().get(key).cloned()
	}

	pub fn contains(&self, key: &ArtifactKey) -> bool {
		self.read().contains_key(key)
	}

	pub fn len(&self) -> usize {
		self.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.read().is_empty()
	}

	/// Every artifact of one projection, ordered by primary key.
	pub fn artifacts_of(&self, definition_id: Uuid) -> Vec<SearchArtifact> {
		self.read()
			.values()
			.filter(|artifact| artifact.key.definition_id == definition_id)
			.cloned()
			.collect()
	}

	/// Artifacts of `table` matching `query`, best rank first.
	///
	/// Hits are per artifact, so a row indexed by several projections of `table` comes back
	/// once per matching projection. Ties order by definition id, then primary key.
	pub fn search_ranked(
		&self,
		table: &str,
		query: &TextQuery,
		weights: &RankWeights,
	) -> Vec<SearchHit> {
		let mut hits: Vec<SearchHit> = self
			.read()
			.values()
			.filter(|artifact| artifact.key.table == table && query.matches(&artifact.vector))
			.map(|artifact| SearchHit {
				key: artifact.key.clone(),
				score: query.rank(&artifact.vector, weights),
			})
			.collect();

		sort_hits(&mut hits);

		hits
	}

	/// Artifacts of `table` whose trigram similarity to `text` reaches `threshold`.
	///
	/// Only artifacts sharing at least one trigram with `text` qualify, even at a zero
	/// threshold.
	pub fn search_similar(
		&self,
		table: &str,
		text: &str,
		padding: TrigramPadding,
		threshold: f32,
	) -> Vec<SearchHit> {
		let wanted = trigrams_of(text, padding);

		if wanted.is_empty() {
			return Vec::new();
		}

		let mut hits: Vec<SearchHit> = self
			.read()
			.values()
			.filter(|artifact| artifact.key.table == table)
			.filter_map(|artifact| {
				let score = artifact.trigrams.similarity(&wanted);

				(score > 0.0 && score >= threshold)
					.then(|| SearchHit { key: artifact.key.clone(), score })
			})
			.collect();

		sort_hits(&mut hits);

		hits
	}

	fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ArtifactKey, SearchArtifact>> {
		self.artifacts.read().unwrap_or_else(|err| err.into_inner())
	}
}

/// Staged artifact writes against a [`MemoryCatalog`].
#[derive(Debug)]
pub struct CatalogTransaction<'a> {
	catalog: &'a MemoryCatalog,
	staged: Vec<ArtifactChange>,
}
impl CatalogTransaction<'_> {
	pub fn is_empty(&self) -> bool {
		self.staged.is_empty()
	}

	/// Publishes every staged write under one lock acquisition.
	pub fn commit(self) {
		let mut artifacts = self.catalog.artifacts.write().unwrap_or_else(|err| err.into_inner());

		for change in self.staged {
			match change {
				ArtifactChange::Upsert { artifact } => {
					artifacts.insert(artifact.key.clone(), artifact);
				},
				ArtifactChange::Delete { key, .. } => {
					artifacts.remove(&key);
				},
				ArtifactChange::Purge { definition_id, .. } => {
					artifacts.retain(|key, _| key.definition_id != definition_id);
				},
			}
		}
	}

	pub fn rollback(self) {
		tracing::debug!(staged = self.staged.len(), "Artifact transaction rolled back.");
	}
}
impl ArtifactWriter for CatalogTransaction<'_> {
	fn upsert(&mut self, artifact: &SearchArtifact) -> Result<()> {
		self.staged.push(ArtifactChange::Upsert { artifact: artifact.clone() });

		Ok(())
	}

	fn delete(&mut self, schema: &str, key: &ArtifactKey) -> Result<()> {
		self.staged.push(ArtifactChange::Delete { schema: schema.to_string(), key: key.clone() });

		Ok(())
	}

	fn purge(&mut self, schema: &str, definition_id: Uuid) -> Result<()> {
		self.staged.push(ArtifactChange::Purge { schema: schema.to_string(), definition_id });

		Ok(())
	}
}

fn sort_hits(hits: &mut [SearchHit]) {
	hits.sort_by(|left, right| {
		right.score.total_cmp(&left.score).then_with(|| left.key.cmp(&right.key))
	});
}
