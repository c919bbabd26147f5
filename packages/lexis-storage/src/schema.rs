use crate::{Error, Result};

/// Bootstrap DDL for one artifact namespace.
pub fn render_schema(schema: &str) -> Result<String> {
	let schema = checked_schema(schema)?;
	let init = include_str!("../../../sql/init.sql");
	let expanded = expand_includes(init);

	Ok(expanded.replace("<SCHEMA>", schema))
}

/// Rejects anything that cannot be spliced unquoted into SQL.
pub fn checked_schema(schema: &str) -> Result<&str> {
	if lexis_config::is_sql_identifier(schema) {
		Ok(schema)
	} else {
		Err(Error::InvalidArgument(format!(
			"Schema {schema:?} must be a lowercase SQL identifier."
		)))
	}
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_schema.sql" => out.push_str(include_str!("../../../sql/00_schema.sql")),
				"tables/001_definitions.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_definitions.sql")),
				"tables/002_searchables.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_searchables.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn includes_are_expanded_and_schema_substituted() {
		let sql = render_schema("search").unwrap();

		assert!(!sql.contains("\\ir"));
		assert!(!sql.contains("<SCHEMA>"));
		assert!(sql.contains("CREATE SCHEMA IF NOT EXISTS search"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS search.definitions"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS search.searchables"));
	}

	#[test]
	fn unsafe_schema_names_are_rejected() {
		assert!(matches!(render_schema("x; DROP TABLE y"), Err(Error::InvalidArgument(_))));
		assert!(matches!(checked_schema("Lexis"), Err(Error::InvalidArgument(_))));
	}
}
