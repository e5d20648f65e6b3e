//! Partition plan for collections too large to list directly.
//!
//! A range of more than [`FANOUT`] entries is split into chunks. The chunk size starts at
//! [`FANOUT`] and grows by a factor of [`FANOUT`] while the range would still need more
//! than [`FANOUT`] whole chunks. Each chunk is planned again with the same rule. A level
//! holds at most `FANOUT + 1` entries: `FANOUT` whole chunks and a truncated remainder.

use std::ops::Range;

/// Entries listed directly before partitioning kicks in, and the chunk growth factor.
pub const FANOUT: u64 = 100;

/// How to present the index range `offset..offset + len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
	/// List each index as its own entry.
	Elements(Range<u64>),
	/// Group into consecutive sub-ranges, the last one possibly shorter.
	Partitions(Vec<Range<u64>>),
}

/// Chunk size for a range of `len` entries, or `None` when it is listed directly.
pub fn chunk_size(len: u64) -> Option<u64> {
	if len <= FANOUT {
		return None;
	}
	let mut chunk = FANOUT;
	while len / chunk > FANOUT {
		chunk = chunk.saturating_mul(FANOUT);
	}
	Some(chunk)
}

pub fn plan(offset: u64, len: u64) -> Plan {
	let Some(chunk) = chunk_size(len) else {
		return Plan::Elements(offset..offset + len);
	};
	let end = offset + len;
	let mut parts = Vec::with_capacity(len.div_ceil(chunk) as usize);
	let mut start = offset;
	while start < end {
		let stop = start.saturating_add(chunk).min(end);
		parts.push(start..stop);
		start = stop;
	}
	Plan::Partitions(parts)
}
