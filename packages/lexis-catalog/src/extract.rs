use serde_json::Value;

use crate::{Error, LanguageSource, Result, SourceExpression, SourceRow};
use lexis_config::FlattenMode;
use lexis_text::Language;

/// Text a projection yields for one row. `None` means the row is not applicable.
pub fn evaluate(
	expression: &SourceExpression,
	row: &SourceRow,
	flatten: FlattenMode,
	max_depth: u32,
) -> Result<Option<String>> {
	match expression {
		SourceExpression::Column { name } => render(column(row, name)?, flatten, max_depth),
		SourceExpression::Concat { columns } => {
			let mut parts = Vec::new();

			for name in columns {
				if let Some(part) = render(column(row, name)?, flatten, max_depth)? {
					parts.push(part);
				}
			}

			if parts.is_empty() {
				return Ok(None);
			}

			Ok(Some(parts.join(" ")))
		},
		SourceExpression::JsonPointer { column: name, pointer } => {
			let document = match column(row, name)? {
				Value::Null => return Ok(None),
				Value::String(raw) => serde_json::from_str::<Value>(raw).map_err(|err| {
					let message = format!("Column {name:?} is not a JSON document: {err}.");

					Error::Extraction { message }
				})?,
				value @ (Value::Object(_) | Value::Array(_)) => value.clone(),
				other => {
					return Err(Error::Extraction {
						message: format!(
							"Column {name:?} holds a {} where a JSON document was expected.",
							kind(other)
						),
					});
				},
			};

			match document.pointer(pointer) {
				Some(value) => render(value, flatten, max_depth),
				None => Ok(None),
			}
		},
	}
}

/// Concrete language for one row. Never fails: unusable row values mean `simple`.
pub fn resolve_language(source: &LanguageSource, row: &SourceRow) -> Language {
	match source {
		LanguageSource::Fixed(language) => *language,
		LanguageSource::FromColumn(name) =>
			Language::from_tag_or_simple(row.get(name).and_then(Value::as_str)),
	}
}

fn column<'a>(row: &'a SourceRow, name: &str) -> Result<&'a Value> {
	row.get(name).ok_or_else(|| Error::Extraction {
		message: format!("Column {name:?} is missing from row {:?}.", row.primary_key),
	})
}

fn render(value: &Value, flatten: FlattenMode, max_depth: u32) -> Result<Option<String>> {
	let text = match value {
		Value::Null => return Ok(None),
		Value::String(text) => text.clone(),
		Value::Bool(flag) => flag.to_string(),
		Value::Number(number) => number.to_string(),
		Value::Array(_) | Value::Object(_) => lexis_text::flatten_json(value, flatten, max_depth)?,
	};

	Ok(Some(text))
}

fn kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}
