use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, NormalizedText, Result};
use lexis_config::TrigramPadding;

/// Distinct three-character windows over padded tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TrigramSet(BTreeSet<String>);
impl TrigramSet {
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn contains(&self, trigram: &str) -> bool {
		self.0.contains(trigram)
	}

	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}

	/// Shared trigrams over all distinct trigrams. Two empty sets score zero.
	pub fn similarity(&self, other: &Self) -> f32 {
		let shared = self.0.intersection(&other.0).count();
		let union = self.0.len() + other.0.len() - shared;

		if union == 0 {
			return 0.0;
		}

		shared as f32 / union as f32
	}

	pub fn similar(&self, other: &Self, threshold: f32) -> bool {
		self.similarity(other) >= threshold
	}
}
impl FromIterator<String> for TrigramSet {
	fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}
impl fmt::Display for TrigramSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("{")?;

		for (idx, trigram) in self.0.iter().enumerate() {
			if idx > 0 {
				f.write_str(",")?;
			}

			f.write_str("\"")?;

			for ch in trigram.chars() {
				if ch == '"' || ch == '\\' {
					f.write_str("\\")?;
				}

				write!(f, "{ch}")?;
			}

			f.write_str("\"")?;
		}

		f.write_str("}")
	}
}
impl FromStr for TrigramSet {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		let syntax = |message: &str| Error::TrigramSyntax { message: message.to_string() };
		let inner = s
			.trim()
			.strip_prefix('{')
			.and_then(|rest| rest.strip_suffix('}'))
			.ok_or_else(|| syntax("expected a braced list"))?;
		let mut out = BTreeSet::new();
		let mut chars = inner.chars().peekable();

		if inner.trim().is_empty() {
			return Ok(Self(out));
		}

		loop {
			while chars.next_if(|ch| ch.is_whitespace()).is_some() {}

			let mut element = String::new();

			if chars.next_if_eq(&'"').is_some() {
				loop {
					match chars.next() {
						Some('"') => break,
						Some('\\') => {
							let escaped = chars.next().ok_or_else(|| syntax("dangling escape"))?;

							element.push(escaped);
						},
						Some(ch) => element.push(ch),
						None => return Err(syntax("unterminated element")),
					}
				}

				while chars.next_if(|ch| ch.is_whitespace()).is_some() {}
			} else {
				while let Some(ch) = chars.next_if(|ch| *ch != ',') {
					element.push(ch);
				}

				element = element.trim().to_string();

				if element.is_empty() {
					return Err(syntax("empty element"));
				}
			}

			out.insert(element);

			match chars.next() {
				None => break,
				Some(',') => {},
				Some(_) => return Err(syntax("expected a comma between elements")),
			}
		}

		Ok(Self(out))
	}
}
impl Serialize for TrigramSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.collect_seq(self.iter())
	}
}
impl<'de> Deserialize<'de> for TrigramSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Self(BTreeSet::deserialize(deserializer)?))
	}
}

pub fn build_trigrams(text: &NormalizedText, padding: TrigramPadding) -> TrigramSet {
	let mut out = BTreeSet::new();

	for token in text.tokens() {
		collect_token(&token.text, padding, &mut out);
	}

	TrigramSet(out)
}

/// Trigrams of free text, used on the query side of a similarity lookup.
pub fn trigrams_of(text: &str, padding: TrigramPadding) -> TrigramSet {
	build_trigrams(&crate::normalize(text, crate::Language::Simple), padding)
}

fn collect_token(token: &str, padding: TrigramPadding, out: &mut BTreeSet<String>) {
	let lead = match padding {
		TrigramPadding::Compat => "  ",
		TrigramPadding::Symmetric => " ",
	};
	let padded: Vec<char> = lead.chars().chain(token.chars()).chain(std::iter::once(' ')).collect();

	for window in padded.windows(3) {
		out.insert(window.iter().collect());
	}
}
