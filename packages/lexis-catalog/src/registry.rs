use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{
	ArtifactChange, ChangeSet, Error, IndexOptions, IndexSpec, LanguageOption, LanguageSource,
	Result, SourceExpression, TableSchema,
};
use lexis_config::{Config, UnregisterPolicy};
use lexis_text::{Language, Weight};

/// Registered projections keyed by table.
///
/// Changed only at schema-change time. Row hooks read it through an `Arc` snapshot.
#[derive(Clone, Debug)]
pub struct Registry {
	default_language: Language,
	default_schema: String,
	unregister: UnregisterPolicy,
	tables: BTreeMap<String, TableSchema>,
	specs: BTreeMap<String, Vec<IndexSpec>>,
}
impl Registry {
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let default_language = Language::from_tag(&cfg.engine.default_language).ok_or_else(|| {
			Error::Configuration {
				message: format!(
					"Default language {:?} is not supported.",
					cfg.engine.default_language
				),
			}
		})?;

		Ok(Self {
			default_language,
			default_schema: cfg.engine.schema.clone(),
			unregister: cfg.engine.unregister,
			tables: BTreeMap::new(),
			specs: BTreeMap::new(),
		})
	}

	pub fn default_language(&self) -> Language {
		self.default_language
	}

	pub fn default_schema(&self) -> &str {
		&self.default_schema
	}

	/// Declares or redeclares a table. Redeclaring may not drop a column a registered
	/// projection reads.
	pub fn declare_table(&mut self, table: TableSchema) -> Result<()> {
		for name in std::iter::once(&table.name)
			.chain(std::iter::once(&table.primary_key))
			.chain(table.columns.iter())
		{
			if !lexis_config::is_sql_identifier(name) {
				return Err(Error::Configuration {
					message: format!("{name:?} is not a valid identifier."),
				});
			}
		}

		for spec in self.specs_for(&table.name) {
			check_columns(&table, &spec.expression, &spec.language)?;
		}

		self.tables.insert(table.name.clone(), table);

		Ok(())
	}

	pub fn table(&self, name: &str) -> Option<&TableSchema> {
		self.tables.get(name)
	}

	/// Registers one searchable projection of `table`.
	///
	/// Registering an identical projection again returns the existing spec.
	pub fn register(
		&mut self,
		table: &str,
		expression: SourceExpression,
		options: IndexOptions,
	) -> Result<IndexSpec> {
		let schema_decl = self.tables.get(table).ok_or_else(|| Error::Configuration {
			message: format!("Table {table:?} is not declared."),
		})?;
		let language = match options.language {
			None => LanguageSource::Fixed(self.default_language),
			Some(LanguageOption::Tag(tag)) => {
				let language = Language::from_tag(&tag).ok_or_else(|| Error::Configuration {
					message: format!("Language tag {tag:?} is not supported."),
				})?;

				LanguageSource::Fixed(language)
			},
			Some(LanguageOption::Column(column)) => LanguageSource::FromColumn(column),
		};
		let schema = options.schema.unwrap_or_else(|| self.default_schema.clone());

		if !lexis_config::is_sql_identifier(&schema) {
			return Err(Error::Configuration {
				message: format!("Schema {schema:?} cannot be created."),
			});
		}

		check_columns(schema_decl, &expression, &language)?;

		let spec = IndexSpec::new(
			table.to_string(),
			expression,
			options.weight.unwrap_or(Weight::D),
			language,
			schema,
		);
		let specs = self.specs.entry(table.to_string()).or_default();

		if let Some(existing) = specs.iter().find(|known| known.definition_id == spec.definition_id)
		{
			return Ok(existing.clone());
		}

		tracing::info!(
			table = %spec.table,
			definition_id = %spec.definition_id,
			weight = %spec.weight,
			schema = %spec.schema,
			"Registered searchable projection."
		);

		specs.push(spec.clone());

		Ok(spec)
	}

	/// Re-adds a previously persisted spec, checking it against the declared tables.
	pub fn restore(&mut self, spec: IndexSpec) -> Result<IndexSpec> {
		let language = match &spec.language {
			LanguageSource::Fixed(language) => LanguageOption::Tag(language.as_str().to_string()),
			LanguageSource::FromColumn(column) => LanguageOption::Column(column.clone()),
		};
		let options = IndexOptions {
			weight: Some(spec.weight),
			language: Some(language),
			schema: Some(spec.schema.clone()),
		};
		let restored = self.register(&spec.table, spec.expression.clone(), options)?;

		if restored.definition_id != spec.definition_id {
			return Err(Error::Configuration {
				message: format!(
					"Stored definition {} does not match its declaration.",
					spec.definition_id
				),
			});
		}

		Ok(restored)
	}

	/// Removes a projection. Under the drop policy the returned change set purges its
	/// artifacts and must be applied by the host. Under the retain policy artifacts stay
	/// in place and are no longer maintained.
	pub fn unregister(&mut self, definition_id: Uuid) -> Result<Unregistered> {
		let not_found = || Error::Configuration {
			message: format!("Definition {definition_id} is not registered."),
		};
		let table = self
			.specs
			.iter()
			.find(|(_, specs)| specs.iter().any(|spec| spec.definition_id == definition_id))
			.map(|(table, _)| table.clone())
			.ok_or_else(not_found)?;
		let specs = self.specs.get_mut(&table).ok_or_else(not_found)?;
		let idx = specs
			.iter()
			.position(|spec| spec.definition_id == definition_id)
			.ok_or_else(not_found)?;
		let spec = specs.remove(idx);

		if specs.is_empty() {
			self.specs.remove(&table);
		}

		let mut purge = ChangeSet::default();

		match self.unregister {
			UnregisterPolicy::DropArtifacts => {
				purge.push(ArtifactChange::Purge {
					schema: spec.schema.clone(),
					definition_id: spec.definition_id,
				});

				tracing::info!(
					table = %spec.table,
					definition_id = %spec.definition_id,
					"Unregistered projection. Its artifacts will be dropped."
				);
			},
			UnregisterPolicy::RetainArtifacts => {
				tracing::info!(
					table = %spec.table,
					definition_id = %spec.definition_id,
					"Unregistered projection. Its artifacts are retained and no longer maintained."
				);
			},
		}

		Ok(Unregistered { spec, purge })
	}

	pub fn spec(&self, definition_id: Uuid) -> Option<&IndexSpec> {
		self.specs().find(|spec| spec.definition_id == definition_id)
	}

	/// Projections of one table, in registration order.
	pub fn specs_for(&self, table: &str) -> &[IndexSpec] {
		self.specs.get(table).map(Vec::as_slice).unwrap_or_default()
	}

	pub fn specs(&self) -> impl Iterator<Item = &IndexSpec> {
		self.specs.values().flatten()
	}

	pub fn is_empty(&self) -> bool {
		self.specs.is_empty()
	}
}

#[derive(Clone, Debug)]
pub struct Unregistered {
	pub spec: IndexSpec,
	/// Empty unless the drop policy applies.
	pub purge: ChangeSet,
}

fn check_columns(
	table: &TableSchema,
	expression: &SourceExpression,
	language: &LanguageSource,
) -> Result<()> {
	let missing = |column: &str| Error::Configuration {
		message: format!("Column {column:?} does not exist on table {:?}.", table.name),
	};

	if let SourceExpression::Concat { columns } = expression
		&& columns.is_empty()
	{
		return Err(Error::Configuration {
			message: "A concatenation needs at least one column.".to_string(),
		});
	}
	if let SourceExpression::JsonPointer { pointer, .. } = expression
		&& !(pointer.is_empty() || pointer.starts_with('/'))
	{
		return Err(Error::Configuration {
			message: format!("JSON pointer {pointer:?} must be empty or start with '/'."),
		});
	}

	for column in expression.columns() {
		if !table.has_column(column) {
			return Err(missing(column));
		}
	}

	if let LanguageSource::FromColumn(column) = language
		&& !table.has_column(column)
	{
		return Err(missing(column));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn registry(cfg: &Config) -> Registry {
		let mut registry = Registry::from_config(cfg).unwrap();

		registry
			.declare_table(TableSchema::new("posts", "id", ["title", "body", "lang"]))
			.unwrap();

		registry
	}

	fn configuration_message(result: Result<IndexSpec>) -> String {
		match result {
			Err(Error::Configuration { message }) => message,
			other => panic!("Expected a configuration error, got {other:?}"),
		}
	}

	#[test]
	fn defaults_come_from_configuration() {
		let mut cfg = Config::default();

		cfg.engine.default_language = "german".to_string();
		cfg.engine.schema = "search".to_string();

		let spec = registry(&cfg)
			.register("posts", SourceExpression::column("title"), IndexOptions::default())
			.unwrap();

		assert_eq!(spec.weight, Weight::D);
		assert_eq!(spec.language, LanguageSource::Fixed(Language::German));
		assert_eq!(spec.schema, "search");
	}

	#[test]
	fn unsupported_default_language_is_rejected() {
		let mut cfg = Config::default();

		cfg.engine.default_language = "klingon".to_string();

		assert!(matches!(Registry::from_config(&cfg), Err(Error::Configuration { .. })));
	}

	#[test]
	fn registration_validates_the_declaration() {
		let mut registry = registry(&Config::default());

		let message = configuration_message(registry.register(
			"comments",
			SourceExpression::column("title"),
			IndexOptions::default(),
		));

		assert!(message.contains("not declared"), "{message}");

		let message = configuration_message(registry.register(
			"posts",
			SourceExpression::column("summary"),
			IndexOptions::default(),
		));

		assert!(message.contains("summary"), "{message}");

		let message = configuration_message(registry.register(
			"posts",
			SourceExpression::column("title"),
			IndexOptions::default().language_tag("xx"),
		));

		assert!(message.contains("not supported"), "{message}");

		let message = configuration_message(registry.register(
			"posts",
			SourceExpression::column("title"),
			IndexOptions::default().language_column("locale"),
		));

		assert!(message.contains("locale"), "{message}");

		let message = configuration_message(registry.register(
			"posts",
			SourceExpression::column("title"),
			IndexOptions::default().schema("Bad Schema"),
		));

		assert!(message.contains("cannot be created"), "{message}");

		let message = configuration_message(registry.register(
			"posts",
			SourceExpression::json_pointer("body", "title"),
			IndexOptions::default(),
		));

		assert!(message.contains("pointer"), "{message}");
		assert!(registry.is_empty());
	}

	#[test]
	fn registering_twice_is_idempotent() {
		let mut registry = registry(&Config::default());
		let options = IndexOptions::default().weight(Weight::A).language_tag("en");
		let title = SourceExpression::column("title");
		let first = registry.register("posts", title.clone(), options.clone()).unwrap();
		let second = registry.register("posts", title, options).unwrap();

		assert_eq!(first, second);
		assert_eq!(registry.specs_for("posts").len(), 1);
	}

	#[test]
	fn unregister_follows_the_configured_policy() {
		let mut cfg = Config::default();
		let mut dropping = registry(&cfg);
		let spec = dropping
			.register("posts", SourceExpression::column("title"), IndexOptions::default())
			.unwrap();
		let removed = dropping.unregister(spec.definition_id).unwrap();

		assert_eq!(removed.spec, spec);
		assert_eq!(removed.purge.len(), 1);
		assert!(dropping.specs_for("posts").is_empty());
		assert!(dropping.unregister(spec.definition_id).is_err());

		cfg.engine.unregister = UnregisterPolicy::RetainArtifacts;

		let mut retaining = registry(&cfg);
		let spec = retaining
			.register("posts", SourceExpression::column("title"), IndexOptions::default())
			.unwrap();

		assert!(retaining.unregister(spec.definition_id).unwrap().purge.is_empty());
	}

	#[test]
	fn redeclaring_cannot_drop_indexed_columns() {
		let mut registry = registry(&Config::default());

		registry
			.register("posts", SourceExpression::concat(["title", "body"]), IndexOptions::default())
			.unwrap();

		assert!(registry.declare_table(TableSchema::new("posts", "id", ["title"])).is_err());
		assert!(
			registry
				.declare_table(TableSchema::new("posts", "id", ["title", "body", "tags"]))
				.is_ok()
		);
	}

	#[test]
	fn restored_specs_keep_their_identity() {
		let mut source = registry(&Config::default());
		let spec = source
			.register(
				"posts",
				SourceExpression::column("title"),
				IndexOptions::default().language_column("lang").weight(Weight::B),
			)
			.unwrap();
		let mut target = registry(&Config::default());

		assert_eq!(target.restore(spec.clone()).unwrap(), spec);
		assert_eq!(target.spec(spec.definition_id), Some(&spec));
	}
}
