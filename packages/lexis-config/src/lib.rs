mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Engine, FlattenMode, OverflowPolicy, Postgres, Ranking, Storage, Trigram,
	TrigramPadding, UnregisterPolicy, Vector,
};

use std::{fs, path::Path, sync::OnceLock};

use regex::Regex;

/// Largest position a weighted positional text vector can carry.
pub const MAX_POSITION: u16 = 16_383;
/// Most positions a single lexeme keeps in a stored text vector.
pub const MAX_POSITIONS_PER_LEXEME: u16 = 256;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.engine.default_language.trim().is_empty() {
		return Err(Error::Validation {
			message: "engine.default_language must be non-empty.".to_string(),
		});
	}
	if !is_sql_identifier(&cfg.engine.schema) {
		return Err(Error::Validation {
			message: "engine.schema must be a lowercase SQL identifier of at most 63 characters."
				.to_string(),
		});
	}
	if cfg.engine.max_json_depth == 0 {
		return Err(Error::Validation {
			message: "engine.max_json_depth must be greater than zero.".to_string(),
		});
	}
	if cfg.vector.max_positions_per_lexeme == 0 {
		return Err(Error::Validation {
			message: "vector.max_positions_per_lexeme must be greater than zero.".to_string(),
		});
	}
	if cfg.vector.max_positions_per_lexeme > MAX_POSITIONS_PER_LEXEME {
		return Err(Error::Validation {
			message: format!(
				"vector.max_positions_per_lexeme must be {MAX_POSITIONS_PER_LEXEME} or less."
			),
		});
	}

	let threshold = cfg.trigram.similarity_threshold;

	if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
		return Err(Error::Validation {
			message: "trigram.similarity_threshold must be in the range 0.0-1.0.".to_string(),
		});
	}

	let weights = [
		("ranking.weight_a", cfg.ranking.weight_a),
		("ranking.weight_b", cfg.ranking.weight_b),
		("ranking.weight_c", cfg.ranking.weight_c),
		("ranking.weight_d", cfg.ranking.weight_d),
	];

	for (label, weight) in weights {
		if !weight.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if weight < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}
	if weights.windows(2).any(|pair| pair[0].1 < pair[1].1) {
		return Err(Error::Validation {
			message: "ranking weights must not increase from weight_a to weight_d.".to_string(),
		});
	}

	if let Some(postgres) = cfg.storage.postgres.as_ref() {
		if postgres.dsn.trim().is_empty() {
			return Err(Error::Validation {
				message: "storage.postgres.dsn must be non-empty.".to_string(),
			});
		}
		if postgres.pool_max_conns == 0 {
			return Err(Error::Validation {
				message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
			});
		}
	}

	Ok(())
}

/// Whether `name` can be used unquoted as a schema, table, or column name.
pub fn is_sql_identifier(name: &str) -> bool {
	static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();

	IDENTIFIER
		.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").ok())
		.as_ref()
		.is_some_and(|re| re.is_match(name))
}

fn normalize(cfg: &mut Config) {
	cfg.engine.default_language = cfg.engine.default_language.trim().to_ascii_lowercase();
	cfg.engine.schema = cfg.engine.schema.trim().to_string();

	if let Some(postgres) = cfg.storage.postgres.as_mut() {
		postgres.dsn = postgres.dsn.trim().to_string();
	}
}
