//! In-region block metadata.
//!
//! Every block is a header immediately followed by its payload bytes, all
//! living inside the caller-supplied region. The header is never visible
//! to callers; only `payload_ptr` escapes the crate.

use std::ptr;

use crate::config;

/// One block's metadata, co-located with the block's payload in the
/// caller-supplied region.
///
/// `prev`/`next` are raw links in address order; a null pointer marks the
/// respective end of the chain. `size` counts payload bytes only, never
/// the header itself.
#[repr(C)]
pub struct BlockHeader {
    pub prev: *mut BlockHeader,
    pub next: *mut BlockHeader,
    pub free: bool,
    pub size: usize,
}

/// Writes a fresh free header at `addr` with the given `size` and no
/// neighbors, returning it as a block pointer.
///
/// # Safety
/// `addr` must point to at least `header_size()` writable bytes.
pub unsafe fn write_header(addr: *mut u8, size: usize) -> *mut BlockHeader {
    let block = addr.cast::<BlockHeader>();
    ptr::write(
        block,
        BlockHeader {
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
            free: true,
            size,
        },
    );
    block
}

/// The payload pointer for a block header.
///
/// # Safety
/// `block` must point to a live, initialized `BlockHeader`.
pub unsafe fn payload_ptr(block: *mut BlockHeader) -> *mut u8 {
    block.cast::<u8>().add(config::header_size())
}

/// Recovers the block header pointer from a payload pointer previously
/// returned by `payload_ptr`.
///
/// # Safety
/// `ptr` must have been produced by `payload_ptr` on a still-live block.
pub unsafe fn block_from_payload(ptr: *mut u8) -> *mut BlockHeader {
    ptr.sub(config::header_size()).cast::<BlockHeader>()
}

/// Zeroes a block's payload bytes.
///
/// # Safety
/// `block` must point to a live, initialized `BlockHeader` whose
/// `size`-byte payload is writable.
pub unsafe fn zero_payload(block: *mut BlockHeader) {
    let size = (*block).size;
    ptr::write_bytes(payload_ptr(block), 0, size);
}

/// The byte address one past the end of `block`'s payload — i.e. where
/// `block.next` must start for the region to tile without gaps.
///
/// # Safety
/// `block` must point to a live, initialized `BlockHeader`.
pub unsafe fn block_end(block: *mut BlockHeader) -> *mut u8 {
    payload_ptr(block).add((*block).size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_roundtrip() {
        let mut buf = vec![0u8; 128];
        unsafe {
            let block = write_header(buf.as_mut_ptr(), buf.len() - config::header_size());
            let payload = payload_ptr(block);
            assert_eq!(block_from_payload(payload), block);
            assert_eq!(block_end(block), buf.as_mut_ptr().add(buf.len()));
        }
    }

    #[test]
    fn header_size_is_pointer_aligned() {
        assert_eq!(
            config::header_size() % std::mem::align_of::<BlockHeader>(),
            0
        );
    }
}
