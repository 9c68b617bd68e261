//! Loader identifiers.

use rand::Rng as _;

const ID_LEN: usize = 6;
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Random ASCII-letter id. Used as the prefix of per-pass topic names.
pub(crate) fn random_loader_id() -> String {
    let mut rng = rand::rng();
    (0..ID_LEN)
        .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
        .collect()
}

/// Topic used by pass number `pass` of loader `loader_id`.
pub(crate) fn topic_name(loader_id: &str, pass: usize) -> String {
    format!("{}_{}", loader_id, pass)
}
