use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of a remote entity, unique within one debug session.
///
/// Peer-assigned for real entities. The model also mints synthetic ids for
/// entities the peer never names (emulated frames, array partitions, watch
/// expressions); those are derived from the owning entity's id so they stay
/// stable across recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	/// Id of the launch root. Top-level contexts report no parent and hang off it.
	pub fn root() -> Self {
		Self(String::new())
	}

	pub fn is_root(&self) -> bool {
		self.0.is_empty()
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for EntityId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for EntityId {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}

impl From<String> for EntityId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

impl Borrow<str> for EntityId {
	fn borrow(&self) -> &str {
		&self.0
	}
}

/// Handle distinguishing one issued command from every other.
///
/// A completion commits to a cache only while its token is still that cache's
/// outstanding token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandToken(pub u64);

impl fmt::Display for CommandToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "cmd#{}", self.0)
	}
}

/// Counter-based token generator. Tokens are never reused within a session.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenGen(u64);

impl TokenGen {
	#[must_use]
	pub const fn new() -> Self {
		Self(0)
	}

	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> CommandToken {
		let token = CommandToken(self.0);
		self.0 += 1;
		token
	}
}
