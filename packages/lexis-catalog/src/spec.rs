use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lexis_text::{Language, Weight};

const DEFINITION_NAMESPACE: Uuid = Uuid::from_u128(0x6c65_7869_735f_4445_4649_4e49_5449_4f4e);

/// Columns a table exposes, declared before projections over it are registered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
	pub name: String,
	pub primary_key: String,
	pub columns: Vec<String>,
}
impl TableSchema {
	pub fn new(
		name: impl Into<String>,
		primary_key: impl Into<String>,
		columns: impl IntoIterator<Item = impl Into<String>>,
	) -> Self {
		Self {
			name: name.into(),
			primary_key: primary_key.into(),
			columns: columns.into_iter().map(Into::into).collect(),
		}
	}

	pub fn has_column(&self, column: &str) -> bool {
		self.primary_key == column || self.columns.iter().any(|name| name == column)
	}
}

/// How searchable text is derived from a row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceExpression {
	Column { name: String },
	/// Applicable parts joined by single spaces.
	Concat { columns: Vec<String> },
	/// RFC 6901 pointer into a structured column.
	JsonPointer { column: String, pointer: String },
}
impl SourceExpression {
	pub fn column(name: impl Into<String>) -> Self {
		Self::Column { name: name.into() }
	}

	pub fn concat(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self::Concat { columns: columns.into_iter().map(Into::into).collect() }
	}

	pub fn json_pointer(column: impl Into<String>, pointer: impl Into<String>) -> Self {
		Self::JsonPointer { column: column.into(), pointer: pointer.into() }
	}

	pub fn columns(&self) -> Vec<&str> {
		match self {
			Self::Column { name } => vec![name.as_str()],
			Self::Concat { columns } => columns.iter().map(String::as_str).collect(),
			Self::JsonPointer { column, .. } => vec![column.as_str()],
		}
	}
}

/// Resolved language selection of a projection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LanguageSource {
	Fixed(Language),
	/// Row column holding a language tag. Absent, null, or unknown tags mean `simple`.
	FromColumn(String),
}

/// Language selection as declared, before tags are checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LanguageOption {
	Tag(String),
	Column(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexOptions {
	/// Defaults to the lowest weight class.
	pub weight: Option<Weight>,
	/// Defaults to the configured process-wide language.
	pub language: Option<LanguageOption>,
	/// Defaults to the configured artifact namespace.
	pub schema: Option<String>,
}
impl IndexOptions {
	pub fn weight(mut self, weight: Weight) -> Self {
		self.weight = Some(weight);

		self
	}

	pub fn language_tag(mut self, tag: impl Into<String>) -> Self {
		self.language = Some(LanguageOption::Tag(tag.into()));

		self
	}

	pub fn language_column(mut self, column: impl Into<String>) -> Self {
		self.language = Some(LanguageOption::Column(column.into()));

		self
	}

	pub fn schema(mut self, schema: impl Into<String>) -> Self {
		self.schema = Some(schema.into());

		self
	}
}

/// One registered searchable projection. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
	pub definition_id: Uuid,
	pub table: String,
	pub expression: SourceExpression,
	pub weight: Weight,
	pub language: LanguageSource,
	pub schema: String,
}
impl IndexSpec {
	pub(crate) fn new(
		table: String,
		expression: SourceExpression,
		weight: Weight,
		language: LanguageSource,
		schema: String,
	) -> Self {
		let definition_id = definition_id(&table, &expression, weight, &language, &schema);

		Self { definition_id, table, expression, weight, language, schema }
	}
}

/// Same projection, same id. Distinct projections never share one.
fn definition_id(
	table: &str,
	expression: &SourceExpression,
	weight: Weight,
	language: &LanguageSource,
	schema: &str,
) -> Uuid {
	let identity = serde_json::json!({
		"table": table,
		"expression": expression,
		"weight": weight,
		"language": language,
		"schema": schema,
	});

	Uuid::new_v5(&DEFINITION_NAMESPACE, identity.to_string().as_bytes())
}
