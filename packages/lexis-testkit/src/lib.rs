//! Disposable Postgres databases with lexis artifact namespaces bootstrapped.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::runtime::Builder;
use uuid::Uuid;

use lexis_config::Postgres;
use lexis_storage::db::Db;

/// Names the server test databases are created on.
pub const DSN_ENV: &str = "LEXIS_PG_DSN";

/// A database created for one test. Dropped on [`TestDatabase::drop_database`] or when
/// the value goes out of scope.
pub struct TestDatabase {
	name: String,
	options: PgConnectOptions,
	maintenance: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	/// Creates a database on the server named by `LEXIS_PG_DSN`, or returns `None` when the
	/// variable is unset.
	pub async fn from_env(test: &str) -> Result<Option<Self>> {
		let Ok(base_dsn) = env::var(DSN_ENV) else {
			eprintln!("Skipping {test}; set {DSN_ENV} to run.");

			return Ok(None);
		};

		Self::create(&base_dsn).await.map(Some)
	}

	/// Creates a fresh database next to the one `base_dsn` points at.
	pub async fn create(base_dsn: &str) -> Result<Self> {
		let maintenance = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Invalid {DSN_ENV}: {err}.")))?;
		let name = format!("lexis_test_{}", Uuid::new_v4().simple());
		let create_sql = format!(r#"CREATE DATABASE "{name}""#);
		let mut conn = PgConnection::connect_with(&maintenance).await?;

		sqlx::query(&create_sql).execute(&mut conn).await?;
		conn.close().await?;

		let options = maintenance.clone().database(&name);

		Ok(Self { name, options, maintenance, dropped: false })
	}

	pub fn postgres(&self, pool_max_conns: u32) -> Postgres {
		Postgres { dsn: self.options.to_url_lossy().to_string(), pool_max_conns }
	}

	/// Connects a pool and creates every artifact namespace in `schemas`.
	pub async fn bootstrap(&self, schemas: &[&str]) -> Result<Db> {
		let db = Db::connect(&self.postgres(4)).await?;

		for schema in schemas {
			db.ensure_schema(schema).await?;
		}

		Ok(db)
	}

	/// Drops the database, disconnecting pools that still use it.
	pub async fn drop_database(mut self) -> Result<()> {
		force_drop(&self.maintenance, &self.name).await?;

		self.dropped = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let maintenance = self.maintenance.clone();
		let name = self.name.clone();
		// A panicking test may drop this inside a runtime, so the drop runs on its own thread.
		let outcome = thread::spawn(move || {
			Builder::new_current_thread()
				.enable_all()
				.build()
				.map_err(|err| Error::Message(format!("Failed to start cleanup runtime: {err}.")))?
				.block_on(force_drop(&maintenance, &name))
		})
		.join();

		match outcome {
			Ok(Ok(())) => {},
			Ok(Err(err)) => eprintln!("Failed to drop test database {}: {err}.", self.name),
			Err(_) => eprintln!("Cleanup of test database {} panicked.", self.name),
		}
	}
}

async fn force_drop(maintenance: &PgConnectOptions, name: &str) -> Result<()> {
	let drop_sql = format!(r#"DROP DATABASE IF EXISTS "{name}" WITH (FORCE)"#);
	let mut conn = PgConnection::connect_with(maintenance).await?;

	sqlx::query(&drop_sql).execute(&mut conn).await?;
	conn.close().await?;

	Ok(())
}
