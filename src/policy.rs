//! Free-block selection policies.
//!
//! Every policy walks the block list under the engine's lock and is
//! deterministic given the same list state; none of them touch a block
//! they don't end up selecting.

use std::str::FromStr;

use crate::block::BlockHeader;
use crate::error::PolicyParseError;

/// Which free-block selection strategy an `Engine` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    FirstFit,
    NextFit,
    BestFit,
    WorstFit,
}

impl FromStr for Policy {
    type Err = PolicyParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "FirstFit" => Ok(Policy::FirstFit),
            "NextFit" => Ok(Policy::NextFit),
            "BestFit" => Ok(Policy::BestFit),
            "WorstFit" => Ok(Policy::WorstFit),
            _ => Err(PolicyParseError {
                token: token.to_string(),
            }),
        }
    }
}

/// Selects a free block able to satisfy `n` payload bytes, per `policy`.
///
/// `cursor` is read and (on a next-fit hit) updated in place; it is
/// otherwise untouched.
///
/// # Safety
/// `head` must be a live, well-formed block chain; `cursor`, if `Some`,
/// must point to a block currently on that chain.
pub unsafe fn select(
    head: *mut BlockHeader,
    cursor: &mut Option<*mut BlockHeader>,
    policy: Policy,
    n: usize,
) -> Option<*mut BlockHeader> {
    match policy {
        Policy::FirstFit => first_fit(head, n),
        Policy::NextFit => next_fit(head, cursor, n),
        Policy::BestFit => best_fit(head, n),
        Policy::WorstFit => worst_fit(head, n),
    }
}

unsafe fn first_fit(head: *mut BlockHeader, n: usize) -> Option<*mut BlockHeader> {
    let mut current = head;
    while !current.is_null() {
        if (*current).free && (*current).size >= n {
            return Some(current);
        }
        current = (*current).next;
    }
    None
}

unsafe fn next_fit(
    head: *mut BlockHeader,
    cursor: &mut Option<*mut BlockHeader>,
    n: usize,
) -> Option<*mut BlockHeader> {
    let start = cursor.unwrap_or(head);
    if start.is_null() {
        return None;
    }

    let mut current = start;
    let mut advanced = false;
    loop {
        if (*current).free && (*current).size >= n {
            // Per spec: cursor resumes at `chosen.next`, which may be
            // null (no block follows) — an unset cursor, in turn,
            // resumes the next search at `head`, so this has the same
            // effect as wrapping without needing a special case here.
            *cursor = if (*current).next.is_null() {
                None
            } else {
                Some((*current).next)
            };
            return Some(current);
        }

        current = if (*current).next.is_null() {
            head
        } else {
            (*current).next
        };
        advanced = true;

        if current == start && advanced {
            return None;
        }
    }
}

unsafe fn best_fit(head: *mut BlockHeader, n: usize) -> Option<*mut BlockHeader> {
    let mut best: Option<*mut BlockHeader> = None;
    let mut current = head;
    while !current.is_null() {
        if (*current).free && (*current).size >= n {
            match best {
                None => best = Some(current),
                Some(candidate) if (*current).size < (*candidate).size => best = Some(current),
                _ => {}
            }
        }
        current = (*current).next;
    }
    best
}

unsafe fn worst_fit(head: *mut BlockHeader, n: usize) -> Option<*mut BlockHeader> {
    let mut worst: Option<*mut BlockHeader> = None;
    let mut current = head;
    while !current.is_null() {
        if (*current).free && (*current).size >= n {
            match worst {
                None => worst = Some(current),
                Some(candidate) if (*current).size > (*candidate).size => worst = Some(current),
                _ => {}
            }
        }
        current = (*current).next;
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tokens() {
        assert_eq!(Policy::from_str("FirstFit"), Ok(Policy::FirstFit));
        assert_eq!(Policy::from_str("NextFit"), Ok(Policy::NextFit));
        assert_eq!(Policy::from_str("BestFit"), Ok(Policy::BestFit));
        assert_eq!(Policy::from_str("WorstFit"), Ok(Policy::WorstFit));
    }

    #[test]
    fn rejects_unknown_token() {
        assert!(Policy::from_str("Bogus").is_err());
    }
}
