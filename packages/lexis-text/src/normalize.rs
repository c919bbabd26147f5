use serde_json::Value;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::{Error, Language, Result};
use lexis_config::{FlattenMode, MAX_POSITION};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
	pub text: String,
	/// 1-based, dense over word tokens, clamped to [`MAX_POSITION`].
	pub position: u16,
}

/// Case-folded word tokens of one source value, in traversal order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedText {
	tokens: Vec<Token>,
	language: Language,
}
impl NormalizedText {
	pub fn tokens(&self) -> &[Token] {
		&self.tokens
	}

	pub fn language(&self) -> Language {
		self.language
	}

	pub fn is_empty(&self) -> bool {
		self.tokens.is_empty()
	}

	pub fn len(&self) -> usize {
		self.tokens.len()
	}

	/// Tokens joined by single spaces.
	pub fn flat_text(&self) -> String {
		let mut out = String::new();

		for (idx, token) in self.tokens.iter().enumerate() {
			if idx > 0 {
				out.push(' ');
			}

			out.push_str(&token.text);
		}

		out
	}
}

pub fn normalize(text: &str, language: Language) -> NormalizedText {
	let composed: String = text.nfkc().collect();
	let tokens = composed
		.unicode_words()
		.enumerate()
		.map(|(idx, word)| Token { text: word.to_lowercase(), position: clamp_position(idx) })
		.collect();

	NormalizedText { tokens, language }
}

/// Flattens a structured value into text in document order.
///
/// Strings contribute themselves, numbers and booleans their JSON text, nulls nothing. Under
/// [`FlattenMode::KeysAndValues`] every object key precedes its value.
pub fn flatten_json(value: &Value, mode: FlattenMode, max_depth: u32) -> Result<String> {
	let mut parts = Vec::new();

	collect_leaves(value, mode, max_depth, 0, &mut parts)?;

	Ok(parts.join(" "))
}

fn collect_leaves(
	value: &Value,
	mode: FlattenMode,
	max_depth: u32,
	depth: u32,
	parts: &mut Vec<String>,
) -> Result<()> {
	match value {
		Value::Null => {},
		Value::Bool(flag) => parts.push(flag.to_string()),
		Value::Number(number) => parts.push(number.to_string()),
		Value::String(text) =>
			if !text.is_empty() {
				parts.push(text.clone());
			},
		Value::Array(items) => {
			let depth = enter(depth, max_depth)?;

			for item in items {
				collect_leaves(item, mode, max_depth, depth, parts)?;
			}
		},
		Value::Object(map) => {
			let depth = enter(depth, max_depth)?;

			for (key, item) in map {
				if mode == FlattenMode::KeysAndValues && !key.is_empty() {
					parts.push(key.clone());
				}

				collect_leaves(item, mode, max_depth, depth, parts)?;
			}
		},
	}

	Ok(())
}

fn enter(depth: u32, max_depth: u32) -> Result<u32> {
	let next = depth + 1;

	if next > max_depth {
		return Err(Error::JsonTooDeep { max_depth });
	}

	Ok(next)
}

fn clamp_position(idx: usize) -> u16 {
	u16::try_from(idx + 1).unwrap_or(MAX_POSITION).min(MAX_POSITION)
}
