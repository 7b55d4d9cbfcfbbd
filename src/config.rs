//! Compile-time tunables for the allocator engine.

use crate::block::BlockHeader;

/// Smallest payload residue a split is allowed to leave behind. A split
/// that would leave less than this is skipped in favor of consuming the
/// whole block (see `engine::split_or_consume`).
pub const MIN_FREE_BLOCK: usize = 32;

/// Size, in bytes, of one in-region block header. Also the payload's
/// guaranteed minimum alignment, since the header's own alignment
/// requirement governs where a block (and therefore its payload) may
/// start.
pub const fn header_size() -> usize {
    core::mem::size_of::<BlockHeader>()
}

/// Soft sanity floor for `region_bytes` at `Engine` construction time.
///
/// The original driver used a flat `1024`-byte floor; this implementation
/// tightens it to the smallest region that could ever hold one header and
/// one satisfiable split residue, per the spec's own suggested
/// tightening (see `SPEC_FULL.md` §9).
pub const fn minimum_region_bytes() -> usize {
    header_size() + MIN_FREE_BLOCK + 1
}
