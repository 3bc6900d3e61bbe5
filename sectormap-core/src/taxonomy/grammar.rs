//! Code grammar: level inference and ancestor derivation from code structure.
//!
//! Native codes carry a one-letter prefix that selects the numbering scheme:
//!
//! | prefix | length | level |
//! |--------|--------|-------|
//! | `T`    | 3      | 0     |
//! | `T`    | 5      | 1     |
//! | `T`    | ≥ 7    | 2     |
//! | `X`    | 3      | 1     |
//! | `X`    | 5      | 2     |
//! | `X`    | ≥ 7    | 3     |
//!
//! Third-party codes are purely numeric: the first two digits name the
//! level-1 industry, the first four the level-2 industry, and the full six
//! digits the level-3 industry.
//!
//! Ancestors are always prefix truncations, so a parent never has to be
//! looked up through an explicit foreign key.

use super::Taxonomy;

/// Infer the nesting level of `code`. Returns `None` for codes the taxonomy's
/// grammar does not accept.
pub fn level_of(taxonomy: Taxonomy, code: &str) -> Option<u8> {
    match taxonomy {
        Taxonomy::Native => native_level(code),
        Taxonomy::ThirdParty => third_party_level(code),
    }
}

/// Derive the ancestor of `code` at `target_level`.
///
/// Returns `None` when `code` is malformed, when it is not strictly deeper
/// than `target_level`, or when the grammar has no such level.
pub fn ancestor(taxonomy: Taxonomy, code: &str, target_level: u8) -> Option<String> {
    let level = level_of(taxonomy, code)?;
    if level <= target_level {
        return None;
    }
    let len = match taxonomy {
        Taxonomy::Native => native_length(code.as_bytes()[0], target_level)?,
        Taxonomy::ThirdParty => third_party_length(target_level)?,
    };
    code.get(..len).map(str::to_string)
}

/// `code` itself when it already sits at `level`, otherwise its ancestor
/// at `level`.
pub fn code_at_level(taxonomy: Taxonomy, code: &str, level: u8) -> Option<String> {
    if level_of(taxonomy, code)? == level {
        Some(code.to_string())
    } else {
        ancestor(taxonomy, code, level)
    }
}

/// Whether `code` is accepted by the taxonomy's grammar.
pub fn is_valid(taxonomy: Taxonomy, code: &str) -> bool {
    level_of(taxonomy, code).is_some()
}

fn native_level(code: &str) -> Option<u8> {
    if !code.is_ascii() {
        return None;
    }
    let len = code.len();
    match code.as_bytes().first()? {
        b'T' => match len {
            3 => Some(0),
            5 => Some(1),
            n if n >= 7 => Some(2),
            _ => None,
        },
        b'X' => match len {
            3 => Some(1),
            5 => Some(2),
            n if n >= 7 => Some(3),
            _ => None,
        },
        _ => None,
    }
}

/// Code length the grammar assigns to `level` under `prefix`.
fn native_length(prefix: u8, level: u8) -> Option<usize> {
    match (prefix, level) {
        (b'T', 0) | (b'X', 1) => Some(3),
        (b'T', 1) | (b'X', 2) => Some(5),
        (b'T', 2) | (b'X', 3) => Some(7),
        _ => None,
    }
}

fn third_party_level(code: &str) -> Option<u8> {
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match code.len() {
        2 => Some(1),
        4 => Some(2),
        6 => Some(3),
        _ => None,
    }
}

fn third_party_length(level: u8) -> Option<usize> {
    match level {
        1 => Some(2),
        2 => Some(4),
        _ => None,
    }
}
