use std::{borrow::Cow, collections::HashSet, fmt, str::FromStr, sync::OnceLock};

use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};

/// Stemming and stopword ruleset applied to a row's text.
///
/// `Simple` is the fallback: tokens are only case-folded, nothing is stemmed and no stopword
/// is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
	Simple,
	English,
	French,
	German,
	Spanish,
}
impl Language {
	pub const ALL: [Self; 5] =
		[Self::Simple, Self::English, Self::French, Self::German, Self::Spanish];

	/// Matches a language name, ISO 639-1, or ISO 639-2 code, ignoring case and surrounding
	/// whitespace.
	pub fn from_tag(tag: &str) -> Option<Self> {
		let tag = tag.trim().to_ascii_lowercase();
		let language = match tag.as_str() {
			"simple" => Self::Simple,
			"en" | "eng" | "english" => Self::English,
			"fr" | "fra" | "fre" | "french" => Self::French,
			"de" | "deu" | "ger" | "german" => Self::German,
			"es" | "spa" | "spanish" => Self::Spanish,
			_ => return None,
		};

		Some(language)
	}

	/// Like [`Language::from_tag`], but absent or unrecognized tags fall back to `Simple`.
	pub fn from_tag_or_simple(tag: Option<&str>) -> Self {
		tag.and_then(Self::from_tag).unwrap_or(Self::Simple)
	}

	/// Canonical name, which is also the host text-search configuration name.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Simple => "simple",
			Self::English => "english",
			Self::French => "french",
			Self::German => "german",
			Self::Spanish => "spanish",
		}
	}

	pub fn is_linguistic(self) -> bool {
		self != Self::Simple
	}

	pub fn is_stopword(self, token: &str) -> bool {
		self.profile().stopwords.contains(token)
	}

	/// Stems one lower-cased token. `Simple` returns the token unchanged.
	pub fn stem(self, token: &str) -> Cow<'_, str> {
		match self.profile().stemmer.as_ref() {
			Some(stemmer) => stemmer.stem(token),
			None => Cow::Borrowed(token),
		}
	}

	/// Stopword filter plus stemmer. `None` means the token does not produce a lexeme.
	pub fn lexeme(self, token: &str) -> Option<String> {
		if self.is_stopword(token) {
			return None;
		}

		let stemmed = self.stem(token);

		if stemmed.is_empty() {
			return None;
		}

		Some(stemmed.into_owned())
	}

	fn profile(self) -> &'static Profile {
		static PROFILES: OnceLock<[Profile; 5]> = OnceLock::new();

		let profiles = PROFILES.get_or_init(|| Self::ALL.map(Profile::build));

		&profiles[self as usize]
	}
}
impl fmt::Display for Language {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Language {
	type Err = UnsupportedLanguage;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_tag(s).ok_or_else(|| UnsupportedLanguage(s.to_string()))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language tag {0:?}.")]
pub struct UnsupportedLanguage(pub String);

struct Profile {
	stemmer: Option<Stemmer>,
	stopwords: HashSet<&'static str>,
}
impl Profile {
	fn build(language: Language) -> Self {
		let (algorithm, list) = match language {
			Language::Simple => (None, ""),
			Language::English =>
				(Some(Algorithm::English), include_str!("../stopwords/english.stop")),
			Language::French => (Some(Algorithm::French), include_str!("../stopwords/french.stop")),
			Language::German => (Some(Algorithm::German), include_str!("../stopwords/german.stop")),
			Language::Spanish =>
				(Some(Algorithm::Spanish), include_str!("../stopwords/spanish.stop")),
		};
		let stopwords = list.lines().map(str::trim).filter(|word| !word.is_empty()).collect();

		Self { stemmer: algorithm.map(Stemmer::create), stopwords }
	}
}
