//! Session tunables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid model config: {0}")]
	Parse(#[from] toml::de::Error),
}

/// Tunables for one [`crate::Session`].
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
	/// Innermost frames fetched per stack trace. `0` fetches the complete stack.
	pub stack_frames_limit: u32,
	/// Delay before a resume is reported, so step-sized resumes never flash "running".
	pub resume_debounce_ms: u64,
	/// Delay before a suspend without a known PC is reported.
	pub suspend_debounce_ms: u64,
	/// Idle entries kept per lookup kind (line, function, symbol file) per context.
	pub lookup_cache_bound: usize,
	pub lookup_first_tick_ms: u64,
	pub lookup_tick_ms: u64,
	/// Keep the last value of a reset cache readable until it settles again.
	pub keep_stale_values: bool,
	/// Retired stack frames kept for reuse.
	pub stack_pool_margin: usize,
	/// Retired sub-expressions kept for reuse.
	pub expression_pool_margin: usize,
}

impl Default for ModelConfig {
	fn default() -> Self {
		Self {
			stack_frames_limit: 10,
			resume_debounce_ms: 400,
			suspend_debounce_ms: 500,
			lookup_cache_bound: 32,
			lookup_first_tick_ms: 4000,
			lookup_tick_ms: 2500,
			keep_stale_values: true,
			stack_pool_margin: 16,
			expression_pool_margin: 128,
		}
	}
}

impl ModelConfig {
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&text)
	}

	pub fn stack_limit(&self) -> Option<u32> {
		(self.stack_frames_limit > 0).then_some(self.stack_frames_limit)
	}

	pub fn resume_debounce(&self) -> Duration {
		Duration::from_millis(self.resume_debounce_ms)
	}

	pub fn suspend_debounce(&self) -> Duration {
		Duration::from_millis(self.suspend_debounce_ms)
	}

	pub fn lookup_first_tick(&self) -> Duration {
		Duration::from_millis(self.lookup_first_tick_ms)
	}

	pub fn lookup_tick(&self) -> Duration {
		Duration::from_millis(self.lookup_tick_ms)
	}
}
