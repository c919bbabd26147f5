use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row as the host hands it to a mutation hook. Column order is preserved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
	pub table: String,
	pub primary_key: String,
	pub columns: Map<String, Value>,
}
impl SourceRow {
	pub fn new(table: impl Into<String>, primary_key: impl ToString) -> Self {
		Self { table: table.into(), primary_key: primary_key.to_string(), columns: Map::new() }
	}

	pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
		self.columns.insert(column.into(), value.into());

		self
	}

	pub fn get(&self, column: &str) -> Option<&Value> {
		self.columns.get(column)
	}
}
