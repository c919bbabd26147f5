use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
	pub engine: Engine,
	pub vector: Vector,
	pub trigram: Trigram,
	pub ranking: Ranking,
	pub storage: Storage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Engine {
	/// Language used by specs that do not name one. Overridable to "simple".
	pub default_language: String,
	/// Namespace that holds the artifact tables when a spec does not name one.
	pub schema: String,
	pub flatten: FlattenMode,
	pub unregister: UnregisterPolicy,
	pub max_json_depth: u32,
}
impl Default for Engine {
	fn default() -> Self {
		Self {
			default_language: "simple".to_string(),
			schema: "lexis".to_string(),
			flatten: FlattenMode::default(),
			unregister: UnregisterPolicy::default(),
			max_json_depth: 64,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlattenMode {
	/// Each object key is emitted before its value.
	#[default]
	KeysAndValues,
	ValuesOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnregisterPolicy {
	#[default]
	DropArtifacts,
	RetainArtifacts,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Vector {
	pub max_positions_per_lexeme: u16,
	pub overflow: OverflowPolicy,
}
impl Default for Vector {
	fn default() -> Self {
		Self { max_positions_per_lexeme: 256, overflow: OverflowPolicy::default() }
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
	/// Keep the earliest positions and drop the rest.
	#[default]
	KeepFirst,
	/// Keep the latest positions and drop the earliest.
	KeepLast,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Trigram {
	pub padding: TrigramPadding,
	pub similarity_threshold: f32,
}
impl Default for Trigram {
	fn default() -> Self {
		Self { padding: TrigramPadding::default(), similarity_threshold: 0.3 }
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrigramPadding {
	/// Two leading spaces and one trailing space per token.
	#[default]
	Compat,
	/// One leading and one trailing space per token.
	Symmetric,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Ranking {
	pub weight_a: f32,
	pub weight_b: f32,
	pub weight_c: f32,
	pub weight_d: f32,
}
impl Default for Ranking {
	fn default() -> Self {
		Self { weight_a: 1.0, weight_b: 0.4, weight_c: 0.2, weight_d: 0.1 }
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Storage {
	pub postgres: Option<Postgres>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	#[serde(default = "default_pool_max_conns")]
	pub pool_max_conns: u32,
}

fn default_pool_max_conns() -> u32 {
	4
}
