use std::sync::Arc;

use serde_json::Value;

use lexis_catalog::{
	ArtifactKey, CatalogSynchronizer, ChangeSet, IndexOptions, IndexSpec, MemoryCatalog, Pipeline,
	Registry, SourceExpression, SourceRow, TableSchema,
};
use lexis_config::{Config, TrigramPadding};
use lexis_storage::{Result, db::Db, queries};
use lexis_testkit::TestDatabase;
use lexis_text::{Language, RankWeights, TextQuery, Weight};

const SCHEMA: &str = "lexis";

/// Host database: a `posts` table whose writes carry their artifact changes.
struct Host {
	db: Db,
	sync: CatalogSynchronizer,
}
impl Host {
	async fn new(test_db: &TestDatabase, registry: Registry) -> Self {
		let db = test_db.bootstrap(&[SCHEMA]).await.expect("Failed to bootstrap schema.");

		sqlx::query("CREATE TABLE posts (id text PRIMARY KEY, title text, language text)")
			.execute(&db.pool)
			.await
			.expect("Failed to create host table.");

		Self { db, sync: CatalogSynchronizer::new(Arc::new(registry), Pipeline::default()) }
	}

	async fn insert(&self, row: &SourceRow) -> Result<ChangeSet> {
		let changes = self.sync.on_row_inserted(row);
		let mut tx = self.db.pool.begin().await?;

		sqlx::query("INSERT INTO posts (id, title, language) VALUES ($1,$2,$3)")
			.bind(row.primary_key.as_str())
			.bind(text_column(row, "title"))
			.bind(text_column(row, "language"))
			.execute(&mut *tx)
			.await?;
		queries::apply_changes_tx(&mut tx, &changes).await?;
		tx.commit().await?;

		Ok(changes)
	}

	async fn update(&self, old: &SourceRow, new: &SourceRow) -> Result<ChangeSet> {
		let changes = self.sync.on_row_updated(old, new);
		let mut tx = self.db.pool.begin().await?;

		sqlx::query("UPDATE posts SET id = $2, title = $3, language = $4 WHERE id = $1")
			.bind(old.primary_key.as_str())
			.bind(new.primary_key.as_str())
			.bind(text_column(new, "title"))
			.bind(text_column(new, "language"))
			.execute(&mut *tx)
			.await?;
		queries::apply_changes_tx(&mut tx, &changes).await?;
		tx.commit().await?;

		Ok(changes)
	}

	async fn delete(&self, row: &SourceRow) -> Result<()> {
		let changes = self.sync.on_row_deleted(row);
		let mut tx = self.db.pool.begin().await?;

		sqlx::query("DELETE FROM posts WHERE id = $1")
			.bind(row.primary_key.as_str())
			.execute(&mut *tx)
			.await?;
		queries::apply_changes_tx(&mut tx, &changes).await?;
		tx.commit().await?;

		Ok(())
	}

	async fn artifact_exists(&self, spec: &IndexSpec, primary_key: &str) -> bool {
		queries::fetch_artifact(&self.db.pool, SCHEMA, &ArtifactKey::new(spec, primary_key))
			.await
			.expect("Failed to fetch artifact.")
			.is_some()
	}
}

fn text_column<'a>(row: &'a SourceRow, column: &str) -> Option<&'a str> {
	row.get(column).and_then(Value::as_str)
}

fn posts_registry() -> Registry {
	let mut registry = Registry::from_config(&Config::default()).unwrap();

	registry.declare_table(TableSchema::new("posts", "id", ["title", "language"])).unwrap();

	registry
}

fn post(id: u32, title: impl Into<Value>) -> SourceRow {
	SourceRow::new("posts", id).with("title", title).with("language", Value::Null)
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LEXIS_PG_DSN to run."]
async fn stored_artifacts_match_the_computed_ones() {
	let Some(test_db) = TestDatabase::from_env("stored_artifacts_match_the_computed_ones")
		.await
		.expect("Failed to create test database.")
	else {
		return;
	};
	let mut registry = posts_registry();
	let spec = registry
		.register(
			"posts",
			SourceExpression::column("title"),
			IndexOptions::default().weight(Weight::A).language_column("language"),
		)
		.unwrap();
	let host = Host::new(&test_db, registry).await;
	let changes = host
		.insert(&post(1, "It's the Fat Rats' \\ party").with("language", "en"))
		.await
		.expect("Insert failed.");
	let computed = changes.upserts().next().expect("Row must be applicable.").clone();
	let stored = queries::fetch_artifact(&host.db.pool, SCHEMA, &computed.key)
		.await
		.expect("Failed to fetch artifact.")
		.expect("Artifact must be stored.");

	assert_eq!(stored.key, ArtifactKey::new(&spec, "1"));
	assert_eq!(stored.text, computed.text);
	assert_eq!(stored.language, Language::English);
	assert_eq!(stored.weight, Weight::A);
	assert_eq!(stored.vector, computed.vector);
	assert_eq!(stored.trigrams, computed.trigrams);
	assert_eq!(stored.fingerprint, computed.fingerprint);

	test_db.drop_database().await.expect("Failed to drop test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LEXIS_PG_DSN to run."]
async fn rolled_back_mutations_leave_no_artifact() {
	let Some(test_db) = TestDatabase::from_env("rolled_back_mutations_leave_no_artifact")
		.await
		.expect("Failed to create test database.")
	else {
		return;
	};
	let mut registry = posts_registry();
	let spec = registry
		.register("posts", SourceExpression::column("title"), IndexOptions::default())
		.unwrap();
	let host = Host::new(&test_db, registry).await;
	let row = post(1, "Never committed");
	let changes = host.sync.on_row_inserted(&row);
	let mut tx = host.db.pool.begin().await.expect("Failed to begin transaction.");

	sqlx::query("INSERT INTO posts (id, title) VALUES ($1,$2)")
		.bind(row.primary_key.as_str())
		.bind("Never committed")
		.execute(&mut *tx)
		.await
		.expect("Failed to insert row.");
	queries::apply_changes_tx(&mut tx, &changes).await.expect("Failed to apply changes.");
	tx.rollback().await.expect("Failed to roll back.");

	assert!(!host.artifact_exists(&spec, "1").await);
	assert_eq!(
		queries::count_artifacts(&host.db.pool, SCHEMA, spec.definition_id).await.unwrap(),
		0
	);

	test_db.drop_database().await.expect("Failed to drop test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LEXIS_PG_DSN to run."]
async fn artifacts_follow_updates_and_deletes() {
	let Some(test_db) = TestDatabase::from_env("artifacts_follow_updates_and_deletes")
		.await
		.expect("Failed to create test database.")
	else {
		return;
	};
	let mut registry = posts_registry();
	let spec = registry
		.register("posts", SourceExpression::column("title"), IndexOptions::default())
		.unwrap();
	let host = Host::new(&test_db, registry).await;
	let first = post(1, "A fat cat");

	host.insert(&first).await.expect("Insert failed.");
	assert!(host.artifact_exists(&spec, "1").await);

	let cleared = post(1, Value::Null);

	host.update(&first, &cleared).await.expect("Update failed.");
	assert!(!host.artifact_exists(&spec, "1").await);

	let moved = post(2, "A thin cat");

	host.update(&cleared, &moved).await.expect("Update failed.");
	assert!(!host.artifact_exists(&spec, "1").await);
	assert!(host.artifact_exists(&spec, "2").await);

	let key = ArtifactKey::new(&spec, "2");
	let before = queries::fetch_artifact(&host.db.pool, SCHEMA, &key).await.unwrap().unwrap();

	// Same content, same fingerprint: the stored row is left as it was.
	host.update(&moved, &moved).await.expect("Update failed.");

	let after = queries::fetch_artifact(&host.db.pool, SCHEMA, &key).await.unwrap().unwrap();

	assert_eq!(after.fingerprint, before.fingerprint);
	assert_eq!(after.updated_at, before.updated_at);

	host.delete(&moved).await.expect("Delete failed.");
	assert_eq!(
		queries::count_artifacts(&host.db.pool, SCHEMA, spec.definition_id).await.unwrap(),
		0
	);

	test_db.drop_database().await.expect("Failed to drop test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LEXIS_PG_DSN to run."]
async fn searches_agree_with_the_memory_catalog() {
	let Some(test_db) = TestDatabase::from_env("searches_agree_with_the_memory_catalog")
		.await
		.expect("Failed to create test database.")
	else {
		return;
	};
	let mut registry = posts_registry();

	registry
		.register(
			"posts",
			SourceExpression::column("title"),
			IndexOptions::default().weight(Weight::A).language_column("language"),
		)
		.unwrap();

	let host = Host::new(&test_db, registry).await;
	let memory = MemoryCatalog::new();
	let rows = [
		post(1, "The Fat Rats").with("language", "en"),
		post(2, "The Fat Rats").with("language", "xx"),
		post(3, "Die fetten Ratten").with("language", "de"),
		post(4, "Stephen"),
		post(5, "Steve"),
		post(6, "Seven"),
		post(7, "Margaret"),
	];

	for row in &rows {
		let changes = host.insert(row).await.expect("Insert failed.");

		memory.apply(&changes).unwrap();
	}

	let weights = RankWeights::default();
	let query = TextQuery::parse("fat & !thin", Language::English).unwrap();
	let ranked =
		queries::search_ranked(&host.db.pool, SCHEMA, "posts", &query, &weights, 10).await.unwrap();
	let ids: Vec<&str> = ranked.iter().map(|hit| hit.key.primary_key.as_str()).collect();
	let expected: Vec<String> = memory
		.search_ranked("posts", &query, &weights)
		.into_iter()
		.map(|hit| hit.key.primary_key)
		.collect();

	assert_eq!(ids, ["1", "2"]);
	assert_eq!(ids, expected);

	let similar = queries::search_similar(
		&host.db.pool,
		SCHEMA,
		"posts",
		"steven",
		TrigramPadding::Compat,
		0.3,
		10,
	)
	.await
	.unwrap();
	let expected = memory.search_similar("posts", "steven", TrigramPadding::Compat, 0.3);

	assert_eq!(similar.len(), expected.len());

	for (stored, computed) in similar.iter().zip(&expected) {
		assert_eq!(stored.key, computed.key);
		assert!((stored.score - computed.score).abs() < 1e-6);
	}

	let empty = TextQuery::parse("the", Language::English).unwrap();

	assert!(empty.is_empty());
	assert!(
		queries::search_ranked(&host.db.pool, SCHEMA, "posts", &empty, &weights, 10)
			.await
			.unwrap()
			.is_empty()
	);

	test_db.drop_database().await.expect("Failed to drop test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LEXIS_PG_DSN to run."]
async fn definitions_are_restored_and_purged() {
	let Some(test_db) = TestDatabase::from_env("definitions_are_restored_and_purged")
		.await
		.expect("Failed to create test database.")
	else {
		return;
	};
	let mut registry = posts_registry();
	let title = registry
		.register("posts", SourceExpression::column("title"), IndexOptions::default())
		.unwrap();
	let tagged = registry
		.register(
			"posts",
			SourceExpression::concat(["title", "language"]),
			IndexOptions::default().weight(Weight::B).language_tag("en"),
		)
		.unwrap();
	let mut host = Host::new(&test_db, registry.clone()).await;
	let mut tx = host.db.pool.begin().await.unwrap();

	for spec in [&title, &tagged] {
		queries::save_definition_tx(&mut tx, spec).await.unwrap();
		// Saving twice is harmless.
		queries::save_definition_tx(&mut tx, spec).await.unwrap();
	}

	tx.commit().await.unwrap();

	let stored = queries::list_definitions(&host.db.pool, SCHEMA).await.unwrap();
	let mut restored = posts_registry();

	for spec in stored {
		restored.restore(spec).unwrap();
	}

	let ids = |registry: &Registry| {
		let mut ids: Vec<_> = registry.specs().map(|spec| spec.definition_id).collect();

		ids.sort();

		ids
	};

	assert_eq!(ids(&restored), ids(&registry));

	host.insert(&post(1, "Kept")).await.unwrap();

	let unregistered = restored.unregister(tagged.definition_id).unwrap();
	let mut tx = host.db.pool.begin().await.unwrap();

	queries::apply_changes_tx(&mut tx, &unregistered.purge).await.unwrap();
	queries::delete_definition_tx(&mut tx, SCHEMA, tagged.definition_id).await.unwrap();
	tx.commit().await.unwrap();
	host.sync.install(Arc::new(restored));

	assert_eq!(
		queries::count_artifacts(&host.db.pool, SCHEMA, tagged.definition_id).await.unwrap(),
		0
	);
	assert!(host.artifact_exists(&title, "1").await);
	assert_eq!(queries::list_definitions(&host.db.pool, SCHEMA).await.unwrap(), [title.clone()]);

	let mut tx = host.db.pool.begin().await.unwrap();
	let missing = queries::delete_definition_tx(&mut tx, SCHEMA, tagged.definition_id).await;

	assert!(matches!(missing, Err(lexis_storage::Error::NotFound(_))));

	drop(tx);
	test_db.drop_database().await.expect("Failed to drop test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LEXIS_PG_DSN to run."]
async fn storage_failures_abort_the_mutation() {
	let Some(test_db) = TestDatabase::from_env("storage_failures_abort_the_mutation")
		.await
		.expect("Failed to create test database.")
	else {
		return;
	};
	let mut registry = posts_registry();

	// Artifacts of this projection live in a namespace that was never created.
	registry
		.register(
			"posts",
			SourceExpression::column("title"),
			IndexOptions::default().schema("unbootstrapped"),
		)
		.unwrap();

	let host = Host::new(&test_db, registry).await;
	let err = host.insert(&post(1, "Orphan")).await.unwrap_err();
	let count: i64 = sqlx::query_scalar("SELECT count(*) FROM posts")
		.fetch_one(&host.db.pool)
		.await
		.unwrap();

	assert_eq!(count, 0, "The row write must roll back with the artifact write.");
	assert!(matches!(
		lexis_catalog::Error::from(err),
		lexis_catalog::Error::Transactional { .. }
	));

	test_db.drop_database().await.expect("Failed to drop test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LEXIS_PG_DSN to run."]
async fn oversized_words_and_repeats_store_as_computed() {
	let Some(test_db) = TestDatabase::from_env("oversized_words_and_repeats_store_as_computed")
		.await
		.expect("Failed to create test database.")
	else {
		return;
	};
	let mut registry = posts_registry();
	let spec = registry
		.register("posts", SourceExpression::column("title"), IndexOptions::default())
		.unwrap();
	let host = Host::new(&test_db, registry).await;
	let long_word = format!("hello {}", "a".repeat(3_000));
	let repeated = vec!["w"; 300].join(" ");

	host.insert(&post(1, long_word.as_str())).await.expect("Long words must not fail the write.");

	let changes = host.insert(&post(2, repeated.as_str())).await.expect("Insert failed.");
	let computed = changes.upserts().next().expect("Row must be applicable.").clone();
	let long = queries::fetch_artifact(&host.db.pool, SCHEMA, &ArtifactKey::new(&spec, "1"))
		.await
		.unwrap()
		.expect("Artifact must be stored.");
	let capped = queries::fetch_artifact(&host.db.pool, SCHEMA, &computed.key)
		.await
		.unwrap()
		.expect("Artifact must be stored.");

	assert_eq!(long.vector.lexemes().collect::<Vec<_>>(), ["hello"]);
	assert_eq!(capped.vector.get("w").map(<[_]>::len), Some(256));
	assert_eq!(capped.vector, computed.vector);
	assert_eq!(capped.fingerprint, computed.fingerprint);

	test_db.drop_database().await.expect("Failed to drop test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LEXIS_PG_DSN to run."]
async fn similarity_needs_a_shared_trigram_in_both_stores() {
	let Some(test_db) = TestDatabase::from_env("similarity_needs_a_shared_trigram_in_both_stores")
		.await
		.expect("Failed to create test database.")
	else {
		return;
	};
	let mut registry = posts_registry();

	registry
		.register("posts", SourceExpression::column("title"), IndexOptions::default())
		.unwrap();

	let host = Host::new(&test_db, registry).await;
	let memory = MemoryCatalog::new();

	for row in [post(1, "Stephen"), post(2, "Margaret")] {
		let changes = host.insert(&row).await.expect("Insert failed.");

		memory.apply(&changes).unwrap();
	}

	let stored = queries::search_similar(
		&host.db.pool,
		SCHEMA,
		"posts",
		"steven",
		TrigramPadding::Compat,
		0.0,
		10,
	)
	.await
	.unwrap();
	let computed = memory.search_similar("posts", "steven", TrigramPadding::Compat, 0.0);
	let ids = |hits: &[lexis_catalog::SearchHit]| {
		hits.iter().map(|hit| hit.key.primary_key.clone()).collect::<Vec<_>>()
	};

	assert_eq!(ids(&stored), ["1"]);
	assert_eq!(ids(&stored), ids(&computed));

	test_db.drop_database().await.expect("Failed to drop test database.");
}
