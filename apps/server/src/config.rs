//! Server settings, from the command line, the environment and an optional
//! JSON file, in that order of precedence.

use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use clap::Parser;
use mc_store::Driver;
use mc_utils::error::FileIOError;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_ADDRESS: &str = "localhost:8080";
const DEFAULT_STORE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error("invalid config file '{}': {source}", .path.display())]
	Json {
		path: Box<Path>,
		#[source]
		source: serde_json::Error,
	},
	#[error("invalid store interval <interval='{0}'>, expected seconds or <n>s, <n>m, <n>h")]
	Interval(String),
}

#[derive(Debug, Default, Parser)]
#[command(name = "mc-server", version, about = "Collects metrics reported by agents")]
pub struct Cli {
	/// Address to listen on
	#[arg(short = 'a', long, env = "ADDRESS")]
	pub address: Option<String>,

	/// Seconds between snapshot saves, 0 saves after every update
	#[arg(short = 'i', long, env = "STORE_INTERVAL")]
	pub store_interval: Option<u64>,

	/// File the metrics are snapshotted to
	#[arg(short = 'f', long, env = "FILE_STORAGE_PATH")]
	pub store_file: Option<PathBuf>,

	/// Load the last snapshot on startup
	#[arg(short = 'r', long, env = "RESTORE")]
	pub restore: Option<bool>,

	/// PostgreSQL connection URL
	#[arg(short = 'd', long, env = "DATABASE_DSN")]
	pub database_dsn: Option<String>,

	/// Storage driver: mem, file or pgx. Derived from the other options when unset
	#[arg(long, env = "STORAGE_DRIVER")]
	pub driver: Option<String>,

	/// JSON file providing defaults for every option above
	#[arg(short = 'c', long, env = "CONFIG")]
	pub config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
	address: Option<String>,
	store_interval: Option<IntervalValue>,
	store_file: Option<PathBuf>,
	restore: Option<bool>,
	database_dsn: Option<String>,
	storage_driver: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IntervalValue {
	Seconds(u64),
	Text(String),
}

impl IntervalValue {
	fn to_duration(&self) -> Result<Duration, ConfigError> {
		match self {
			Self::Seconds(secs) => Ok(Duration::from_secs(*secs)),
			Self::Text(text) => parse_interval(text),
		}
	}
}

/// Accepts `"300"`, `"300s"`, `"5m"` and `"1h"`
fn parse_interval(text: &str) -> Result<Duration, ConfigError> {
	let invalid = || ConfigError::Interval(text.to_string());
	let trimmed = text.trim();

	let (digits, multiplier) = match trimmed.char_indices().last() {
		Some((idx, 's')) => (&trimmed[..idx], 1),
		Some((idx, 'm')) => (&trimmed[..idx], 60),
		Some((idx, 'h')) => (&trimmed[..idx], 60 * 60),
		Some(_) => (trimmed, 1),
		None => return Err(invalid()),
	};

	digits
		.parse::<u64>()
		.ok()
		.and_then(|value| value.checked_mul(multiplier))
		.map(Duration::from_secs)
		.ok_or_else(invalid)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
	pub address: String,
	pub store_interval: Duration,
	pub restore: bool,
	pub driver: Driver,
	/// Snapshot path or connection URL, depending on the driver
	pub location: String,
}

impl ServerConfig {
	pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
		let file = match &cli.config {
			Some(path) => load_file(path)?,
			None => FileConfig::default(),
		};

		let store_interval = match (cli.store_interval, &file.store_interval) {
			(Some(secs), _) => Duration::from_secs(secs),
			(None, Some(interval)) => interval.to_duration()?,
			(None, None) => DEFAULT_STORE_INTERVAL,
		};

		let database_dsn = cli
			.database_dsn
			.or(file.database_dsn)
			.filter(|dsn| !dsn.is_empty());
		let store_file = cli
			.store_file
			.or(file.store_file)
			.filter(|path| !path.as_os_str().is_empty());

		let driver = match cli.driver.or(file.storage_driver) {
			Some(name) => Driver::from_name(&name),
			None if database_dsn.is_some() => Driver::Postgres,
			None if store_file.is_some() => Driver::File,
			None => Driver::Memory,
		};

		let location = match driver {
			Driver::Postgres => database_dsn.unwrap_or_default(),
			Driver::File => store_file
				.map(|path| path.to_string_lossy().into_owned())
				.unwrap_or_default(),
			Driver::Memory => String::new(),
		};

		Ok(Self {
			address: cli
				.address
				.or(file.address)
				.unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
			store_interval,
			restore: cli.restore.or(file.restore).unwrap_or(true),
			driver,
			location,
		})
	}
}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
	let bytes =
		std::fs::read(path).map_err(FileIOError::new("failed to read config file", path))?;

	serde_json::from_slice(&bytes).map_err(|source| ConfigError::Json {
		path: path.into(),
		source,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cli(args: &[&str]) -> Cli {
		Cli::try_parse_from(std::iter::once("mc-server").chain(args.iter().copied())).unwrap()
	}

	#[test]
	fn defaults() {
		let config = ServerConfig::resolve(Cli::default()).unwrap();

		assert_eq!(
			config,
			ServerConfig {
				address: DEFAULT_ADDRESS.to_string(),
				store_interval: DEFAULT_STORE_INTERVAL,
				restore: true,
				driver: Driver::Memory,
				location: String::new(),
			}
		);
	}

	#[test]
	fn flags_select_the_driver() {
		let config = ServerConfig::resolve(cli(&["-f", "/tmp/metrics.json", "-i", "0"])).unwrap();
		assert_eq!(config.driver, Driver::File);
		assert_eq!(config.location, "/tmp/metrics.json");
		assert_eq!(config.store_interval, Duration::ZERO);

		let config = ServerConfig::resolve(cli(&[
			"-f",
			"/tmp/metrics.json",
			"-d",
			"postgres://localhost/metrics",
		]))
		.unwrap();
		assert_eq!(config.driver, Driver::Postgres);
		assert_eq!(config.location, "postgres://localhost/metrics");

		let config =
			ServerConfig::resolve(cli(&["--driver", "mem", "-d", "postgres://localhost/metrics"]))
				.unwrap();
		assert_eq!(config.driver, Driver::Memory);
		assert_eq!(config.location, "");
	}

	#[test]
	fn restore_can_be_disabled() {
		let config = ServerConfig::resolve(cli(&["-r", "false"])).unwrap();
		assert!(!config.restore);
	}

	#[test]
	fn file_fills_what_flags_leave_out() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(
			&path,
			r#"{
				"address": "0.0.0.0:9090",
				"store_interval": "2m",
				"store_file": "/var/lib/metrics.json",
				"restore": false
			}"#,
		)
		.unwrap();

		let config = ServerConfig::resolve(cli(&[
			"-c",
			path.to_str().unwrap(),
			"-a",
			"127.0.0.1:8081",
		]))
		.unwrap();

		assert_eq!(config.address, "127.0.0.1:8081");
		assert_eq!(config.store_interval, Duration::from_secs(120));
		assert_eq!(config.driver, Driver::File);
		assert_eq!(config.location, "/var/lib/metrics.json");
		assert!(!config.restore);
	}

	#[test]
	fn bad_config_files_are_reported() {
		let dir = tempfile::tempdir().unwrap();

		let missing = dir.path().join("missing.json");
		assert!(matches!(
			ServerConfig::resolve(cli(&["-c", missing.to_str().unwrap()])),
			Err(ConfigError::FileIO(_))
		));

		let broken = dir.path().join("broken.json");
		std::fs::write(&broken, "{").unwrap();
		assert!(matches!(
			ServerConfig::resolve(cli(&["-c", broken.to_str().unwrap()])),
			Err(ConfigError::Json { .. })
		));
	}

	#[test]
	fn intervals() {
		assert_eq!(parse_interval("300").unwrap(), Duration::from_secs(300));
		assert_eq!(parse_interval("10s").unwrap(), Duration::from_secs(10));
		assert_eq!(parse_interval("5m").unwrap(), Duration::from_secs(300));
		assert_eq!(parse_interval("1h").unwrap(), Duration::from_secs(3600));
		assert_eq!(parse_interval("0").unwrap(), Duration::ZERO);

		for bad in ["", "s", "1d", "-5s", "five"] {
			assert!(
				matches!(parse_interval(bad), Err(ConfigError::Interval(_))),
				"{bad} should be rejected"
			);
		}
	}
}
