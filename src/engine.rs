//! The allocator engine: block-list bookkeeping, splitting, coalescing,
//! and the lock that makes all of it safe to call from multiple threads.

use std::ptr::NonNull;
use std::str::FromStr;

use crate::block::{self, BlockHeader};
use crate::config;
use crate::error::PolicyParseError;
use crate::policy::{self, Policy};
use crate::stats::HeapStats;
use crate::sync::spinlock::SpinLock;

/// The mutable part of an engine's state: the block chain itself and the
/// next-fit resume point. Everything else about an `Engine` (region
/// bounds, policy) is fixed at construction and never mutates, so it
/// lives outside the lock.
struct ListState {
    head: *mut BlockHeader,
    cursor: Option<*mut BlockHeader>,
}

/// A bounded-region allocator engine.
///
/// Construct one over a caller-supplied byte region and a [`Policy`],
/// then call [`Engine::allocate`]/[`Engine::deallocate`] from as many
/// threads as you like — every public operation is a single critical
/// section under the engine's internal lock.
pub struct Engine {
    region_ptr: *mut u8,
    region_bytes: usize,
    policy: Policy,
    list: SpinLock<ListState>,
}

// SAFETY:
// - All mutable state (`ListState`) is guarded by `list`'s spinlock.
// - `region_ptr`/`region_bytes`/`policy` are set once at construction and
//   never mutated afterward.
unsafe impl Send for Engine {}
unsafe impl Sync for Engine {}

impl Engine {
    /// Initializes an engine over a `'static` byte region.
    ///
    /// # Panics
    /// Panics if `region` is shorter than
    /// `config::minimum_region_bytes()`.
    pub fn new(region: &'static mut [u8], policy: Policy) -> Engine {
        let region_bytes = region.len();
        let region_ptr = region.as_mut_ptr();
        // SAFETY: `region_ptr` is non-null and `region_bytes` bytes are
        // writable for the `'static` lifetime of `region`.
        unsafe { Engine::from_raw_parts(region_ptr, region_bytes, policy) }
    }

    /// Initializes an engine from a raw pointer and length, for callers
    /// managing the backing memory themselves.
    ///
    /// # Safety
    /// `region_ptr` must be non-null and valid for reads and writes of
    /// `region_bytes` bytes for as long as the returned `Engine` (and any
    /// payload references it hands out) remain in use.
    ///
    /// # Panics
    /// Panics (contract violation) if `region_ptr` is null or
    /// `region_bytes` is below `config::minimum_region_bytes()`.
    pub unsafe fn from_raw_parts(
        region_ptr: *mut u8,
        region_bytes: usize,
        policy: Policy,
    ) -> Engine {
        assert!(
            !region_ptr.is_null(),
            "Engine::from_raw_parts: region pointer must not be null"
        );
        let floor = config::minimum_region_bytes();
        assert!(
            region_bytes >= floor,
            "Engine::from_raw_parts: region_bytes {region_bytes} is below the minimum {floor}"
        );

        let head = block::write_header(region_ptr, region_bytes - config::header_size());

        Engine {
            region_ptr,
            region_bytes,
            policy,
            list: SpinLock::new(ListState { head, cursor: None }),
        }
    }

    /// Initializes an engine, parsing `policy_name` the way a config
    /// file or CLI flag would. `None` defaults to [`Policy::FirstFit`].
    ///
    /// # Errors
    /// Returns `Err` if `policy_name` is `Some` and not one of the
    /// recognised tokens.
    pub fn with_policy_name(
        region: &'static mut [u8],
        policy_name: Option<&str>,
    ) -> Result<Engine, PolicyParseError> {
        let policy = match policy_name {
            Some(token) => Policy::from_str(token)?,
            None => Policy::FirstFit,
        };
        Ok(Engine::new(region, policy))
    }

    /// Allocates `n_bytes` of zeroed payload, or returns `None` if no
    /// free block can satisfy the request under the engine's policy.
    ///
    /// # Panics
    /// Panics if `n_bytes` is zero.
    pub fn allocate(&self, n_bytes: usize) -> Option<NonNull<u8>> {
        assert!(n_bytes > 0, "Engine::allocate: n_bytes must be positive");

        let mut list = self.list.lock();
        // SAFETY: `list.head` is a well-formed chain maintained by this
        // engine under its own lock, which we are holding.
        let chosen = unsafe { policy::select(list.head, &mut list.cursor, self.policy, n_bytes) }?;

        // SAFETY: `chosen` was just returned by `select` as a live free
        // block on `list`'s chain.
        unsafe {
            split_or_consume(chosen, n_bytes);
            Some(NonNull::new_unchecked(block::payload_ptr(chosen)))
        }
    }

    /// Releases a payload reference previously returned by
    /// [`Engine::allocate`]. `None` is a no-op.
    ///
    /// Releasing an already-free block is logged and ignored. Releasing
    /// a reference that does not fall within this engine's region is a
    /// contract violation and panics.
    pub fn deallocate(&self, payload: Option<NonNull<u8>>) {
        let Some(payload) = payload else {
            return;
        };

        let mut list = self.list.lock();
        // SAFETY: if `payload` really came from `allocate`, subtracting
        // `header_size()` recovers the block header that precedes it.
        unsafe {
            let block = block::block_from_payload(payload.as_ptr());
            self.assert_in_region(block);

            if (*block).free {
                log::warn!(
                    "Engine::deallocate: block at offset {} is already free; ignoring double release",
                    block as usize - self.region_ptr as usize
                );
                return;
            }

            (*block).free = true;
            coalesce(block, &mut list);
        }
    }

    /// Walks the block list and panics if any invariant from the data
    /// model is violated. Intended for tests and debug builds, but safe
    /// to call at any time since it never mutates state.
    pub fn validate(&self) {
        let list = self.list.lock();

        // SAFETY: the chain reachable from `list.head` is maintained by
        // this engine and we hold its lock for the whole walk.
        unsafe {
            assert!(
                !list.head.is_null(),
                "Engine::validate: head must be non-null (invariant 1)"
            );
            assert_eq!(
                list.head as usize, self.region_ptr as usize,
                "Engine::validate: head must equal the region base (invariant 1)"
            );

            let mut current = list.head;
            let mut total_bytes = 0usize;
            let mut prev_was_free = false;
            let mut cursor_seen = list.cursor.is_none();

            while !current.is_null() {
                let header = &*current;
                assert!(
                    header.size > 0,
                    "Engine::validate: block at offset {} has non-positive size (invariant 6)",
                    current as usize - self.region_ptr as usize
                );

                if !header.next.is_null() {
                    assert_eq!(
                        block::block_end(current) as usize,
                        header.next as usize,
                        "Engine::validate: block at offset {} leaves a gap before its successor (invariant 3)",
                        current as usize - self.region_ptr as usize
                    );
                    assert_eq!(
                        (*header.next).prev, current,
                        "Engine::validate: broken back-link after offset {} (invariant 2)",
                        current as usize - self.region_ptr as usize
                    );
                }
                if !header.prev.is_null() {
                    assert_eq!(
                        (*header.prev).next, current,
                        "Engine::validate: broken forward-link before offset {} (invariant 2)",
                        current as usize - self.region_ptr as usize
                    );
                }

                assert!(
                    !(prev_was_free && header.free),
                    "Engine::validate: adjacent free blocks at offset {} (invariant 5)",
                    current as usize - self.region_ptr as usize
                );
                prev_was_free = header.free;

                total_bytes += config::header_size() + header.size;

                if list.cursor == Some(current) {
                    cursor_seen = true;
                }

                current = header.next;
            }

            assert_eq!(
                total_bytes, self.region_bytes,
                "Engine::validate: block sizes do not sum to region_bytes (invariant 4)"
            );
            assert!(
                cursor_seen,
                "Engine::validate: cursor does not point to a block on the list (invariant 7)"
            );
        }
    }

    /// Emits one debug-level log line per block: its offset, size, and
    /// free/busy state. Never mutates state.
    pub fn print_all_nodes(&self) {
        let list = self.list.lock();
        let mut current = list.head;
        let mut index = 0usize;

        // SAFETY: same walk discipline as `validate`.
        unsafe {
            while !current.is_null() {
                let header = &*current;
                log::debug!(
                    "block[{index}] offset={offset} size={size} free={free}",
                    index = index,
                    offset = current as usize - self.region_ptr as usize,
                    size = header.size,
                    free = header.free,
                );
                current = header.next;
                index += 1;
            }
        }
    }

    /// Alias for [`Engine::print_all_nodes`] — the walk logs through the
    /// `log` crate rather than printing, so callers reaching for the
    /// more accurate name can use this one instead.
    pub fn log_nodes(&self) {
        self.print_all_nodes()
    }

    /// Returns a read-only snapshot of region/allocation/block counts.
    pub fn stats(&self) -> HeapStats {
        let list = self.list.lock();
        let mut stats = HeapStats {
            region_bytes: self.region_bytes,
            ..Default::default()
        };
        let mut current = list.head;

        // SAFETY: same walk discipline as `validate`.
        unsafe {
            while !current.is_null() {
                let header = &*current;
                stats.live_blocks += 1;
                if header.free {
                    stats.free_blocks += 1;
                    stats.free_bytes += header.size;
                } else {
                    stats.allocated_bytes += header.size;
                }
                current = header.next;
            }
        }
        stats
    }

    /// # Safety
    /// Caller holds `self.list`'s lock (enforced by taking `&self`, since
    /// every call site above does so after locking).
    unsafe fn assert_in_region(&self, block: *mut BlockHeader) {
        let addr = block as usize;
        let start = self.region_ptr as usize;
        let end = start + self.region_bytes;
        assert!(
            addr >= start && addr < end,
            "Engine::deallocate: payload reference does not fall within this engine's region"
        );
    }
}

/// Splits `block` into an `n`-byte busy head and a free tail, or marks
/// the whole block busy when the tail would be smaller than
/// `header_size() + MIN_FREE_BLOCK`. Either way, zeroes the (possibly
/// shrunk) payload before returning.
///
/// # Safety
/// `block` must be a live free block on the chain with `size >= n`.
unsafe fn split_or_consume(block: *mut BlockHeader, n: usize) {
    let old_size = (*block).size;
    let remainder = old_size - n;

    if remainder >= config::header_size() + config::MIN_FREE_BLOCK {
        let new_addr = block::payload_ptr(block).add(n);
        let new_block = block::write_header(new_addr, remainder - config::header_size());

        (*new_block).next = (*block).next;
        (*new_block).prev = block;
        if !(*new_block).next.is_null() {
            (*(*new_block).next).prev = new_block;
        }
        (*block).next = new_block;
        (*block).size = n;
    }

    (*block).free = false;
    block::zero_payload(block);
}

/// Marks `block` free (already done by the caller) and fuses it with a
/// free `prev` and/or a free `next`, updating `list.cursor` so it never
/// ends up pointing at an absorbed block.
///
/// # Safety
/// `block` must be a live block on `list`'s chain, already marked free.
unsafe fn coalesce(block: *mut BlockHeader, list: &mut ListState) {
    let mut result = block;

    let prev = (*result).prev;
    if !prev.is_null() && (*prev).free {
        (*prev).size += config::header_size() + (*result).size;
        (*prev).next = (*result).next;
        if !(*result).next.is_null() {
            (*(*result).next).prev = prev;
        }
        if list.cursor == Some(result) {
            list.cursor = Some((*result).next);
        }
        result = prev;
    }

    let next = (*result).next;
    if !next.is_null() && (*next).free {
        (*result).size += config::header_size() + (*next).size;
        (*result).next = (*next).next;
        if !(*next).next.is_null() {
            (*(*next).next).prev = result;
        }
        if list.cursor == Some(next) {
            list.cursor = Some((*next).next);
        }
    }
}
