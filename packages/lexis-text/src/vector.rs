use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, NormalizedText, Result};
use lexis_config::{MAX_POSITION, MAX_POSITIONS_PER_LEXEME, OverflowPolicy};

/// Longest lexeme, in UTF-8 bytes, a stored text vector accepts.
pub const MAX_LEXEME_BYTES: usize = 2_046;

/// Ordinal rank attached to positions. `A` ranks highest, `D` lowest.
#[derive(
	Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Weight {
	#[default]
	D,
	C,
	B,
	A,
}
impl Weight {
	pub fn letter(self) -> char {
		match self {
			Self::A => 'A',
			Self::B => 'B',
			Self::C => 'C',
			Self::D => 'D',
		}
	}

	pub fn from_letter(letter: char) -> Option<Self> {
		match letter.to_ascii_uppercase() {
			'A' => Some(Self::A),
			'B' => Some(Self::B),
			'C' => Some(Self::C),
			'D' => Some(Self::D),
			_ => None,
		}
	}
}
impl fmt::Display for Weight {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.letter())
	}
}
impl FromStr for Weight {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		let mut chars = s.trim().chars();

		match (chars.next(), chars.next()) {
			(Some(letter), None) => Self::from_letter(letter),
			_ => None,
		}
		.ok_or_else(|| Error::VectorSyntax { message: format!("unknown weight {s:?}") })
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeightedPosition {
	pub position: u16,
	pub weight: Weight,
}

#[derive(Clone, Debug)]
pub struct VectorOptions {
	pub max_positions_per_lexeme: u16,
	pub overflow: OverflowPolicy,
}
impl Default for VectorOptions {
	fn default() -> Self {
		Self::from(&lexis_config::Vector::default())
	}
}
impl From<&lexis_config::Vector> for VectorOptions {
	fn from(cfg: &lexis_config::Vector) -> Self {
		Self { max_positions_per_lexeme: cfg.max_positions_per_lexeme, overflow: cfg.overflow }
	}
}

/// Stemmed lexeme to sorted, deduplicated, weighted positions.
///
/// Lexemes iterate in code-point order, so the canonical text form is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LexemeVector {
	entries: BTreeMap<String, Vec<WeightedPosition>>,
}
impl LexemeVector {
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn get(&self, lexeme: &str) -> Option<&[WeightedPosition]> {
		self.entries.get(lexeme).map(Vec::as_slice)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &[WeightedPosition])> {
		self.entries.iter().map(|(lexeme, positions)| (lexeme.as_str(), positions.as_slice()))
	}

	pub fn lexemes(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(String::as_str)
	}

	/// Lexemes starting with `prefix`, in order.
	pub fn with_prefix<'a>(
		&'a self,
		prefix: &'a str,
	) -> impl Iterator<Item = (&'a str, &'a [WeightedPosition])> + 'a {
		self.entries
			.range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
			.take_while(move |(lexeme, _)| lexeme.starts_with(prefix))
			.map(|(lexeme, positions)| (lexeme.as_str(), positions.as_slice()))
	}

	/// Every weight class that appears in this vector.
	pub fn weights(&self) -> Vec<Weight> {
		let mut weights: Vec<Weight> =
			self.entries.values().flatten().map(|position| position.weight).collect();

		weights.sort_unstable();
		weights.dedup();

		weights
	}
}
impl fmt::Display for LexemeVector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (idx, (lexeme, positions)) in self.entries.iter().enumerate() {
			if idx > 0 {
				f.write_str(" ")?;
			}

			f.write_str("'")?;

			for ch in lexeme.chars() {
				match ch {
					'\'' => f.write_str("''")?,
					'\\' => f.write_str("\\\\")?,
					_ => write!(f, "{ch}")?,
				}
			}

			f.write_str("'")?;

			for (pos_idx, position) in positions.iter().enumerate() {
				f.write_str(if pos_idx == 0 { ":" } else { "," })?;

				write!(f, "{}", position.position)?;

				if position.weight != Weight::D {
					write!(f, "{}", position.weight)?;
				}
			}
		}

		Ok(())
	}
}
impl FromStr for LexemeVector {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		VectorParser { chars: s.chars().collect(), idx: 0 }.parse()
	}
}
impl Serialize for LexemeVector {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.collect_str(self)
	}
}
impl<'de> Deserialize<'de> for LexemeVector {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		raw.parse().map_err(serde::de::Error::custom)
	}
}

/// Stopword removal and stemming keyed to the text's language, grouped by lexeme.
///
/// Positions keep their token numbering; removed stopwords leave gaps. Every position
/// carries `weight`. Lexemes longer than [`MAX_LEXEME_BYTES`] are skipped.
pub fn build_vector(text: &NormalizedText, weight: Weight, opts: &VectorOptions) -> LexemeVector {
	let language = text.language();
	let mut entries: BTreeMap<String, Vec<WeightedPosition>> = BTreeMap::new();

	for token in text.tokens() {
		let Some(lexeme) = language.lexeme(&token.text) else { continue };

		if lexeme.len() > MAX_LEXEME_BYTES {
			tracing::debug!(
				bytes = lexeme.len(),
				position = token.position,
				"Skipped over-long lexeme."
			);

			continue;
		}

		entries
			.entry(lexeme)
			.or_default()
			.push(WeightedPosition { position: token.position, weight });
	}

	let cap = usize::from(opts.max_positions_per_lexeme.clamp(1, MAX_POSITIONS_PER_LEXEME));

	for (lexeme, positions) in entries.iter_mut() {
		positions.sort_unstable();
		positions.dedup_by_key(|position| position.position);

		if positions.len() > cap {
			let dropped = positions.len() - cap;

			match opts.overflow {
				OverflowPolicy::KeepFirst => positions.truncate(cap),
				OverflowPolicy::KeepLast => {
					positions.drain(..dropped);
				},
			}

			tracing::debug!(lexeme = %lexeme, dropped, "Lexeme position list capped.");
		}
	}

	LexemeVector { entries }
}

struct VectorParser {
	chars: Vec<char>,
	idx: usize,
}
impl VectorParser {
	fn parse(mut self) -> Result<LexemeVector> {
		let mut entries: BTreeMap<String, Vec<WeightedPosition>> = BTreeMap::new();

		loop {
			self.skip_whitespace();

			if self.idx >= self.chars.len() {
				break;
			}

			let lexeme = self.lexeme()?;
			let positions = self.positions()?;
			let slot = entries.entry(lexeme).or_default();

			slot.extend(positions);
			slot.sort_unstable();
			slot.dedup_by_key(|position| position.position);
		}

		Ok(LexemeVector { entries })
	}

	fn lexeme(&mut self) -> Result<String> {
		if self.peek() != Some('\'') {
			return Err(self.error("expected a quoted lexeme"));
		}

		self.idx += 1;

		let mut out = String::new();

		loop {
			match self.next() {
				Some('\'') =>
					if self.peek() == Some('\'') {
						self.idx += 1;
						out.push('\'');
					} else {
						break;
					},
				Some('\\') => match self.next() {
					Some(escaped) => out.push(escaped),
					None => return Err(self.error("dangling escape")),
				},
				Some(ch) => out.push(ch),
				None => return Err(self.error("unterminated lexeme")),
			}
		}

		if out.is_empty() {
			return Err(self.error("empty lexeme"));
		}

		Ok(out)
	}

	fn positions(&mut self) -> Result<Vec<WeightedPosition>> {
		let mut out = Vec::new();

		if self.peek() != Some(':') {
			return Ok(out);
		}

		loop {
			self.idx += 1;

			let start = self.idx;

			while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
				self.idx += 1;
			}

			let digits: String = self.chars[start..self.idx].iter().collect();
			let position = digits
				.parse::<u32>()
				.ok()
				.filter(|position| *position >= 1)
				.ok_or_else(|| self.error("expected a position"))?;
			let position = u16::try_from(position).unwrap_or(MAX_POSITION).min(MAX_POSITION);
			let weight = match self.peek().and_then(Weight::from_letter) {
				Some(weight) => {
					self.idx += 1;

					weight
				},
				None => Weight::D,
			};

			out.push(WeightedPosition { position, weight });

			if self.peek() != Some(',') {
				break;
			}
		}

		match self.peek() {
			None => Ok(out),
			Some(ch) if ch.is_whitespace() => Ok(out),
			Some(_) => Err(self.error("unexpected character after positions")),
		}
	}

	fn skip_whitespace(&mut self) {
		while self.peek().is_some_and(char::is_whitespace) {
			self.idx += 1;
		}
	}

	fn peek(&self) -> Option<char> {
		self.chars.get(self.idx).copied()
	}

	fn next(&mut self) -> Option<char> {
		let ch = self.peek()?;

		self.idx += 1;

		Some(ch)
	}

	fn error(&self, what: &str) -> Error {
		Error::VectorSyntax { message: format!("{what} at offset {}", self.idx) }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{Language, normalize};

	fn vector(text: &str, language: Language, weight: Weight) -> LexemeVector {
		build_vector(&normalize(text, language), weight, &VectorOptions::default())
	}

	#[test]
	fn simple_language_keeps_every_token() {
		let built = vector("a fat cat sat on a mat and ate a fat rat", Language::Simple, Weight::D);

		assert_eq!(
			built.to_string(),
			"'a':1,6,10 'and':8 'ate':9 'cat':3 'fat':2,11 'mat':7 'on':5 'rat':12 'sat':4"
		);
	}

	#[test]
	fn weight_letters_are_attached_except_for_d() {
		assert_eq!(
			vector("The Fat Rats", Language::Simple, Weight::A).to_string(),
			"'fat':2A 'rats':3A 'the':1A"
		);
		assert_eq!(
			vector("The Fat Rats", Language::English, Weight::B).to_string(),
			"'fat':2B 'rat':3B"
		);
	}

	#[test]
	fn german_stopwords_leave_position_gaps() {
		let built = vector("Die fetten Ratten", Language::German, Weight::A);

		assert_eq!(built.to_string(), "'fett':2A 'ratt':3A");
	}

	#[test]
	fn caps_positions_per_lexeme() {
		let text = normalize("w w w w w", Language::Simple);
		let keep_first =
			VectorOptions { max_positions_per_lexeme: 2, overflow: OverflowPolicy::KeepFirst };
		let keep_last =
			VectorOptions { max_positions_per_lexeme: 2, overflow: OverflowPolicy::KeepLast };

		assert_eq!(build_vector(&text, Weight::D, &keep_first).to_string(), "'w':1,2");
		assert_eq!(build_vector(&text, Weight::D, &keep_last).to_string(), "'w':4,5");
	}

	#[test]
	fn position_cap_never_exceeds_stored_limit() {
		let words = vec!["w"; 300].join(" ");
		let text = normalize(&words, Language::Simple);
		let opts =
			VectorOptions { max_positions_per_lexeme: 300, overflow: OverflowPolicy::KeepFirst };
		let built = build_vector(&text, Weight::D, &opts);

		assert_eq!(built.get("w").map(<[WeightedPosition]>::len), Some(256));
	}

	#[test]
	fn over_long_lexemes_are_skipped() {
		let long = "a".repeat(3_000);
		let edge = "b".repeat(MAX_LEXEME_BYTES);
		let built = vector(&format!("hello {long} {edge} world"), Language::Simple, Weight::D);

		assert_eq!(built.lexemes().collect::<Vec<_>>(), [edge.as_str(), "hello", "world"]);
		assert_eq!(built.get("world").map(|positions| positions[0].position), Some(4));
	}

	#[test]
	fn empty_text_builds_empty_vector() {
		let built = vector("", Language::English, Weight::A);

		assert!(built.is_empty());
		assert_eq!(built.to_string(), "");
	}

	#[test]
	fn canonical_form_parses_back() {
		let built = vector("it's a clock and o'clock", Language::Simple, Weight::C);
		let text = built.to_string();
		let parsed: LexemeVector = text.parse().unwrap();

		assert_eq!(parsed, built);
		assert!(text.contains("'it''s':1C"), "Quote must be doubled: {text}");
	}

	#[test]
	fn backslashes_are_escaped() {
		let parsed: LexemeVector = r"'a\\b':1B".parse().unwrap();

		assert_eq!(parsed.lexemes().collect::<Vec<_>>(), ["a\\b"]);
		assert_eq!(parsed.to_string(), r"'a\\b':1B");
	}

	#[test]
	fn parser_rejects_malformed_input() {
		for bad in ["fat:1", "'fat':", "'fat':0", "'fat", "'fat':1X", "''"] {
			assert!(bad.parse::<LexemeVector>().is_err(), "Expected failure for {bad:?}");
		}
	}

	#[test]
	fn prefix_lookup_walks_sorted_lexemes() {
		let built = vector("star start stare other", Language::Simple, Weight::D);
		let hits: Vec<&str> = built.with_prefix("star").map(|(lexeme, _)| lexeme).collect();

		assert_eq!(hits, ["star", "stare", "start"]);
	}
}
