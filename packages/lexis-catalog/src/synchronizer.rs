use std::sync::Arc;

use uuid::Uuid;

use crate::{
	ArtifactChange, ArtifactKey, ChangeSet, Error, IndexSpec, Pipeline, Registry, Result,
	SearchArtifact, SourceRow, SyncStats, extract,
	stats::Counters,
};
use lexis_config::Config;

enum Outcome {
	Applicable(SearchArtifact),
	Inapplicable,
	Failed,
}

/// Turns row mutations into artifact changes.
///
/// Hooks run inline on the mutating thread and never touch storage. The host applies the
/// returned [`ChangeSet`] inside the same transaction as the row write, so a rolled back
/// mutation leaves no artifact change behind.
#[derive(Debug)]
pub struct CatalogSynchronizer {
	registry: Arc<Registry>,
	pipeline: Pipeline,
	counters: Counters,
}
impl CatalogSynchronizer {
	pub fn new(registry: Arc<Registry>, pipeline: Pipeline) -> Self {
		Self { registry, pipeline, counters: Counters::default() }
	}

	pub fn from_config(cfg: &Config) -> Result<Self> {
		Ok(Self::new(Arc::new(Registry::from_config(cfg)?), Pipeline::from_config(cfg)))
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.registry
	}

	/// Swaps in a new registry snapshot. Only called at schema-change time.
	pub fn install(&mut self, registry: Arc<Registry>) {
		self.registry = registry;
	}

	pub fn pipeline(&self) -> &Pipeline {
		&self.pipeline
	}

	pub fn stats(&self) -> SyncStats {
		self.counters.snapshot()
	}

	pub fn on_row_inserted(&self, row: &SourceRow) -> ChangeSet {
		Counters::bump(&self.counters.inserts);

		let mut changes = ChangeSet::default();

		for spec in self.registry.specs_for(&row.table) {
			match self.evaluate(spec, row) {
				Outcome::Applicable(artifact) => {
					tracing::debug!(
						table = %row.table,
						primary_key = %row.primary_key,
						definition_id = %spec.definition_id,
						"Artifact created."
					);

					self.upsert(&mut changes, artifact);
				},
				Outcome::Inapplicable | Outcome::Failed => Counters::bump(&self.counters.noops),
			}
		}

		changes
	}

	/// Recomputes every projection of the new row from scratch. A primary-key change moves
	/// the artifact.
	pub fn on_row_updated(&self, old: &SourceRow, new: &SourceRow) -> ChangeSet {
		if old.table != new.table {
			tracing::warn!(
				old_table = %old.table,
				new_table = %new.table,
				primary_key = %new.primary_key,
				"Row update crossed tables. Treating it as a delete and an insert."
			);

			let mut changes = self.on_row_deleted(old);

			changes.extend(self.on_row_inserted(new));

			return changes;
		}

		Counters::bump(&self.counters.updates);

		let moved = old.primary_key != new.primary_key;
		let mut changes = ChangeSet::default();

		for spec in self.registry.specs_for(&new.table) {
			let old_key = ArtifactKey::new(spec, &old.primary_key);

			match self.evaluate(spec, new) {
				Outcome::Applicable(artifact) => {
					if moved {
						self.remove(&mut changes, spec, old_key);
					}

					tracing::debug!(
						table = %new.table,
						primary_key = %new.primary_key,
						definition_id = %spec.definition_id,
						"Artifact recomputed."
					);

					self.upsert(&mut changes, artifact);
				},
				Outcome::Inapplicable | Outcome::Failed =>
					if self.was_absent(spec, old) {
						Counters::bump(&self.counters.noops);
					} else {
						tracing::debug!(
							table = %new.table,
							primary_key = %old.primary_key,
							definition_id = %spec.definition_id,
							"Artifact removed after update."
						);

						self.remove(&mut changes, spec, old_key);
					},
			}
		}

		changes
	}

	pub fn on_row_deleted(&self, row: &SourceRow) -> ChangeSet {
		Counters::bump(&self.counters.deletes);

		let mut changes = ChangeSet::default();

		for spec in self.registry.specs_for(&row.table) {
			tracing::debug!(
				table = %row.table,
				primary_key = %row.primary_key,
				definition_id = %spec.definition_id,
				"Artifact removed with its row."
			);

			self.remove(&mut changes, spec, ArtifactKey::new(spec, &row.primary_key));
		}

		changes
	}

	/// Artifacts for rows that existed before `definition_id` was registered.
	pub fn backfill<'a, I>(&self, definition_id: Uuid, rows: I) -> Result<ChangeSet>
	where
		I: IntoIterator<Item = &'a SourceRow>,
	{
		let spec = self.registry.spec(definition_id).ok_or_else(|| Error::Configuration {
			message: format!("Definition {definition_id} is not registered."),
		})?;
		let mut changes = ChangeSet::default();

		for row in rows.into_iter().filter(|row| row.table == spec.table) {
			match self.evaluate(spec, row) {
				Outcome::Applicable(artifact) => self.upsert(&mut changes, artifact),
				Outcome::Inapplicable | Outcome::Failed => Counters::bump(&self.counters.noops),
			}
		}

		tracing::info!(
			table = %spec.table,
			definition_id = %definition_id,
			artifacts = changes.len(),
			"Backfilled projection."
		);

		Ok(changes)
	}

	fn evaluate(&self, spec: &IndexSpec, row: &SourceRow) -> Outcome {
		match self.pipeline.build(spec, row) {
			Ok(Some(artifact)) => Outcome::Applicable(artifact),
			Ok(None) => Outcome::Inapplicable,
			Err(err) => {
				Counters::bump(&self.counters.extraction_failures);

				tracing::warn!(
					error = %err,
					table = %row.table,
					primary_key = %row.primary_key,
					definition_id = %spec.definition_id,
					"Extraction failed. Treating the row as not applicable."
				);

				Outcome::Failed
			},
		}
	}

	/// Whether the old row certainly had no artifact. A failing extraction is not certain.
	fn was_absent(&self, spec: &IndexSpec, old: &SourceRow) -> bool {
		let Pipeline { flatten, max_json_depth, .. } = &self.pipeline;

		extract::evaluate(&spec.expression, old, *flatten, *max_json_depth)
			.is_ok_and(|text| text.is_none())
	}

	fn upsert(&self, changes: &mut ChangeSet, artifact: SearchArtifact) {
		Counters::bump(&self.counters.upserts);

		changes.push(ArtifactChange::Upsert { artifact });
	}

	fn remove(&self, changes: &mut ChangeSet, spec: &IndexSpec, key: ArtifactKey) {
		Counters::bump(&self.counters.removals);

		changes.push(ArtifactChange::Delete { schema: spec.schema.clone(), key });
	}
}
