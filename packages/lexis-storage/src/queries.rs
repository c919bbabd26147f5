use sqlx::{PgExecutor, Postgres, Transaction};
use uuid::Uuid;

use crate::{
	Error, Result,
	models::{ScoredRow, StoredArtifact, StoredDefinition},
	schema::checked_schema,
};
use lexis_catalog::{ArtifactChange, ArtifactKey, ChangeSet, IndexSpec, SearchArtifact, SearchHit};
use lexis_config::TrigramPadding;
use lexis_text::{RankWeights, TextQuery, trigrams_of};

/// Applies every change inside the caller's transaction. The first failure leaves the
/// transaction for the caller to roll back.
pub async fn apply_changes_tx(
	tx: &mut Transaction<'_, Postgres>,
	changes: &ChangeSet,
) -> Result<()> {
	for change in changes.iter() {
		match change {
			ArtifactChange::Upsert { artifact } => upsert_artifact(&mut **tx, artifact).await?,
			ArtifactChange::Delete { schema, key } =>
				delete_artifact(&mut **tx, schema, key).await?,
			ArtifactChange::Purge { schema, definition_id } => {
				let removed = purge_definition(&mut **tx, schema, *definition_id).await?;

				tracing::info!(%definition_id, removed, "Purged projection artifacts.");
			},
		}
	}

	Ok(())
}

/// Writes the whole artifact. An unchanged fingerprint leaves the stored row untouched.
pub async fn upsert_artifact<'e, E>(executor: E, artifact: &SearchArtifact) -> Result<()>
where
	E: PgExecutor<'e>,
{
	let schema = checked_schema(&artifact.schema)?;
	let sql = format!(
		"\
INSERT INTO {schema}.searchables (
\tdefinition_id,
\ttable_name,
\tprimary_key_value,
\ttext,
\tlanguage,
\tweight,
\tvectors,
\ttrigrams,
\tfingerprint,
\tupdated_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7::tsvector,$8,$9,$10)
ON CONFLICT (definition_id, table_name, primary_key_value) DO UPDATE
SET
\ttext = EXCLUDED.text,
\tlanguage = EXCLUDED.language,
\tweight = EXCLUDED.weight,
\tvectors = EXCLUDED.vectors,
\ttrigrams = EXCLUDED.trigrams,
\tfingerprint = EXCLUDED.fingerprint,
\tupdated_at = EXCLUDED.updated_at
WHERE searchables.fingerprint IS DISTINCT FROM EXCLUDED.fingerprint"
	);
	let trigrams: Vec<String> = artifact.trigrams.iter().map(str::to_string).collect();

	sqlx::query(&sql)
		.bind(artifact.key.definition_id)
		.bind(artifact.key.table.as_str())
		.bind(artifact.key.primary_key.as_str())
		.bind(artifact.text.as_str())
		.bind(artifact.language.as_str())
		.bind(artifact.weight.to_string())
		.bind(artifact.vector.to_string())
		.bind(trigrams)
		.bind(artifact.fingerprint.as_str())
		.bind(artifact.updated_at)
		.execute(executor)
		.await?;

	Ok(())
}

/// Removing an absent artifact is not an error.
pub async fn delete_artifact<'e, E>(executor: E, schema: &str, key: &ArtifactKey) -> Result<()>
where
	E: PgExecutor<'e>,
{
	let schema = checked_schema(schema)?;
	let sql = format!(
		"\
DELETE FROM {schema}.searchables
WHERE definition_id = $1 AND table_name = $2 AND primary_key_value = $3"
	);

	sqlx::query(&sql)
		.bind(key.definition_id)
		.bind(key.table.as_str())
		.bind(key.primary_key.as_str())
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn purge_definition<'e, E>(executor: E, schema: &str, definition_id: Uuid) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let schema = checked_schema(schema)?;
	let sql = format!("DELETE FROM {schema}.searchables WHERE definition_id = $1");
	let result = sqlx::query(&sql).bind(definition_id).execute(executor).await?;

	Ok(result.rows_affected())
}

pub async fn fetch_artifact<'e, E>(
	executor: E,
	schema: &str,
	key: &ArtifactKey,
) -> Result<Option<SearchArtifact>>
where
	E: PgExecutor<'e>,
{
	let checked = checked_schema(schema)?;
	let sql = format!(
		"\
SELECT
\tdefinition_id,
\ttable_name,
\tprimary_key_value,
\ttext,
\tlanguage,
\tweight,
\tvectors::text AS vectors,
\ttrigrams,
\tfingerprint,
\tupdated_at
FROM {checked}.searchables
WHERE definition_id = $1 AND table_name = $2 AND primary_key_value = $3"
	);
	let row = sqlx::query_as::<_, StoredArtifact>(&sql)
		.bind(key.definition_id)
		.bind(key.table.as_str())
		.bind(key.primary_key.as_str())
		.fetch_optional(executor)
		.await?;

	row.map(|row| row.into_artifact(schema)).transpose()
}

pub async fn count_artifacts<'e, E>(executor: E, schema: &str, definition_id: Uuid) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let schema = checked_schema(schema)?;
	let sql = format!("SELECT count(*) FROM {schema}.searchables WHERE definition_id = $1");
	let count: i64 = sqlx::query_scalar(&sql).bind(definition_id).fetch_one(executor).await?;

	Ok(count)
}

/// Persists a registration so it can be restored into a fresh registry. Idempotent.
pub async fn save_definition_tx(
	tx: &mut Transaction<'_, Postgres>,
	spec: &IndexSpec,
) -> Result<()> {
	let schema = checked_schema(&spec.schema)?;
	let payload = serde_json::to_value(spec).map_err(|err| {
		Error::InvalidArgument(format!("Definition {} does not encode: {err}.", spec.definition_id))
	})?;
	let sql = format!(
		"\
INSERT INTO {schema}.definitions (definition_id, table_name, spec)
VALUES ($1,$2,$3)
ON CONFLICT (definition_id) DO NOTHING"
	);

	sqlx::query(&sql)
		.bind(spec.definition_id)
		.bind(spec.table.as_str())
		.bind(payload)
		.execute(&mut **tx)
		.await?;

	Ok(())
}

pub async fn delete_definition_tx(
	tx: &mut Transaction<'_, Postgres>,
	schema: &str,
	definition_id: Uuid,
) -> Result<()> {
	let schema = checked_schema(schema)?;
	let sql = format!("DELETE FROM {schema}.definitions WHERE definition_id = $1");
	let result = sqlx::query(&sql).bind(definition_id).execute(&mut **tx).await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("Definition {definition_id} is not stored.")));
	}

	Ok(())
}

/// Stored registrations in creation order.
pub async fn list_definitions<'e, E>(executor: E, schema: &str) -> Result<Vec<IndexSpec>>
where
	E: PgExecutor<'e>,
{
	let schema = checked_schema(schema)?;
	let sql = format!(
		"\
SELECT definition_id, table_name, spec, created_at
FROM {schema}.definitions
ORDER BY created_at ASC, definition_id ASC"
	);
	let rows = sqlx::query_as::<_, StoredDefinition>(&sql).fetch_all(executor).await?;

	rows.iter().map(StoredDefinition::to_spec).collect()
}

/// Artifacts of `table` matching `query`, best `ts_rank` first.
///
/// The query goes over the wire in canonical form so Postgres never re-stems it. A row
/// indexed by several projections of `table` yields one hit per matching projection.
pub async fn search_ranked<'e, E>(
	executor: E,
	schema: &str,
	table: &str,
	query: &TextQuery,
	weights: &RankWeights,
	limit: i64,
) -> Result<Vec<SearchHit>>
where
	E: PgExecutor<'e>,
{
	if query.is_empty() {
		return Ok(Vec::new());
	}

	let schema = checked_schema(schema)?;
	let sql = format!(
		"\
SELECT
\tdefinition_id,
\ttable_name,
\tprimary_key_value,
\tts_rank($3::float4[], vectors, $2::tsquery) AS score
FROM {schema}.searchables
WHERE table_name = $1 AND vectors @@ $2::tsquery
ORDER BY score DESC, definition_id ASC, primary_key_value COLLATE \"C\" ASC
LIMIT $4"
	);
	// Postgres orders rank weights from D up to A.
	let rank_weights = vec![weights.d, weights.c, weights.b, weights.a];
	let rows = sqlx::query_as::<_, ScoredRow>(&sql)
		.bind(table)
		.bind(query.to_string())
		.bind(rank_weights)
		.bind(limit)
		.fetch_all(executor)
		.await?;

	Ok(rows.into_iter().map(SearchHit::from).collect())
}

/// Artifacts of `table` whose stored trigram set shares at least `threshold` of its union
/// with the trigram set of `text`.
pub async fn search_similar<'e, E>(
	executor: E,
	schema: &str,
	table: &str,
	text: &str,
	padding: TrigramPadding,
	threshold: f32,
	limit: i64,
) -> Result<Vec<SearchHit>>
where
	E: PgExecutor<'e>,
{
	let wanted: Vec<String> = trigrams_of(text, padding).iter().map(str::to_string).collect();

	if wanted.is_empty() {
		return Ok(Vec::new());
	}

	let schema = checked_schema(schema)?;
	let sql = format!(
		"\
SELECT definition_id, table_name, primary_key_value, score
FROM (
\tSELECT
\t\tdefinition_id,
\t\ttable_name,
\t\tprimary_key_value,
\t\t(
\t\t\tSELECT count(*) FROM (SELECT unnest(trigrams) INTERSECT SELECT unnest($2::text[])) shared
\t\t)::float4 / (
\t\t\tSELECT count(*) FROM (SELECT unnest(trigrams) UNION SELECT unnest($2::text[])) total
\t\t)::float4 AS score
\tFROM {schema}.searchables
\tWHERE table_name = $1 AND trigrams && $2::text[]
) scored
WHERE score >= $3
ORDER BY score DESC, definition_id ASC, primary_key_value COLLATE \"C\" ASC
LIMIT $4"
	);
	let rows = sqlx::query_as::<_, ScoredRow>(&sql)
		.bind(table)
		.bind(wanted)
		.bind(threshold)
		.bind(limit)
		.fetch_all(executor)
		.await?;

	Ok(rows.into_iter().map(SearchHit::from).collect())
}
