//! Thin process-wide convenience wrapper around a single [`Engine`].
//!
//! This is sugar, not a parallel implementation: every function here
//! locks a lazily-initialized static `Engine` and forwards to its
//! methods. Callers who want more than one region, or who want to pass
//! the engine around explicitly, should construct `Engine` values
//! directly instead.

use std::ptr::NonNull;
use std::sync::OnceLock;

use crate::engine::Engine;
use crate::policy::Policy;

static GLOBAL: OnceLock<Engine> = OnceLock::new();

/// Initializes the process-wide engine. Panics if called more than once.
///
/// # Safety
/// Same obligations as [`Engine::from_raw_parts`]: `region_ptr` must be
/// non-null and valid for `region_bytes` bytes for the remaining
/// lifetime of the process.
pub unsafe fn initialise(region_ptr: *mut u8, region_bytes: usize, policy: Policy) {
    let engine = Engine::from_raw_parts(region_ptr, region_bytes, policy);
    GLOBAL
        .set(engine)
        .unwrap_or_else(|_| panic!("global::initialise: already initialized"));
}

fn engine() -> &'static Engine {
    GLOBAL
        .get()
        .expect("global allocator used before global::initialise")
}

pub fn allocate(n_bytes: usize) -> Option<NonNull<u8>> {
    engine().allocate(n_bytes)
}

pub fn deallocate(payload: Option<NonNull<u8>>) {
    engine().deallocate(payload)
}

pub fn validate() {
    engine().validate()
}

pub fn print_all_nodes() {
    engine().print_all_nodes()
}

pub fn log_nodes() {
    engine().log_nodes()
}
