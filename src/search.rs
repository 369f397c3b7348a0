//! Trigram similarity for ranked user search.
//!
//! SQLite has no pg_trgm, so the similarity function is implemented here
//! and registered as a deterministic scalar function on the connection.
//! Same shape as pg_trgm: lowercase, pad with two leading and one trailing
//! space, split into trigrams, score = shared / distinct. Bounded [0, 1].

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::collections::HashSet;

/// Fuzzy matches below this threshold are excluded from search results.
pub const SIMILARITY_THRESHOLD: f64 = 0.3;

fn trigrams(s: &str) -> HashSet<[char; 3]> {
    let lowered = s.trim().to_lowercase();
    let mut set = HashSet::new();
    if lowered.is_empty() {
        return set;
    }

    let mut padded: Vec<char> = Vec::with_capacity(lowered.chars().count() + 3);
    padded.push(' ');
    padded.push(' ');
    padded.extend(lowered.chars());
    padded.push(' ');

    for w in padded.windows(3) {
        set.insert([w[0], w[1], w[2]]);
    }
    set
}

/// Trigram set overlap between two strings, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    let distinct = ta.union(&tb).count();
    shared as f64 / distinct as f64
}

/// Register `similarity(a, b)` on the connection so ranking and filtering
/// can live in the same SQL predicate set as exact/prefix matching.
pub fn register_similarity(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "similarity",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a: String = ctx.get(0)?;
            let b: String = ctx.get(1)?;
            Ok(similarity(&a, &b))
        },
    )
}
