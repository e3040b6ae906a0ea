//! Fixed-window text chunking and stable vector identity.
//!
//! Both functions are pure and deterministic; vector ids are derived from
//! chunk positions, so the same crawl re-run overwrites its own entries in
//! the vector index instead of duplicating them.

use sha2::{Digest, Sha256};

/// Splits `text` into overlapping windows of up to `size` characters.
///
/// Consecutive windows start `max(1, size - overlap)` characters apart, so
/// chunking terminates even with `overlap == size - 1`. Emission stops with
/// the first window that reaches the end of the text: the final window may
/// be shorter than `size`, and no window ever lies fully inside the previous
/// one. Empty input yields no chunks.
///
/// Operates on `char` boundaries; a window never splits a scalar value.
///
/// # Panics
///
/// Panics if `size == 0` or `overlap >= size`. Callers going through
/// [`crate::config::WorkerSettings`] have these rejected by `validate`.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    assert!(size > 0, "chunk size must be positive");
    assert!(overlap < size, "overlap must be smaller than chunk size");

    let chars: Vec<char> = text.chars().collect();
    let stride = (size - overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    chunks
}

/// Deterministic vector id for a chunk.
///
/// The URL is hashed so the id stays a flat token regardless of what
/// characters the page URL contains. Identical `(crawl_id, url, chunk_index)`
/// triples always map to the same id; any differing component changes it.
pub fn stable_id(crawl_id: &str, url: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let url_hash = hasher.finalize();
    format!("{crawl_id}-{:x}-{chunk_index}", url_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_text("", 1000, 200).is_empty());
    }

    #[test]
    fn short_input_yields_single_chunk() {
        let chunks = chunk_text("hello", 1000, 200);
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn windows_advance_by_stride_with_overlap() {
        let text: String = ('a'..='z').cycle().take(2500).collect();
        let chunks = chunk_text(&text, 1000, 200);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], text.chars().take(1000).collect::<String>());
        assert_eq!(
            chunks[1],
            text.chars().skip(800).take(1000).collect::<String>()
        );
        assert_eq!(
            chunks[2],
            text.chars().skip(1600).take(900).collect::<String>()
        );
    }

    #[test]
    fn maximal_overlap_still_terminates() {
        let chunks = chunk_text("abcdef", 3, 2);
        // Stride 1: one window per position, stopping at the one that
        // reaches the end.
        assert_eq!(chunks, vec!["abc", "bcd", "cde", "def"]);
    }

    #[test]
    fn no_window_past_the_one_reaching_the_end() {
        // 2400 chars: the window at 1600 ends exactly at the text end, so
        // nothing starts at 2400 even though 2400 < 2500.
        let text: String = ('a'..='z').cycle().take(2400).collect();
        let chunks = chunk_text(&text, 1000, 200);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 800);
    }

    #[test]
    fn stable_id_is_deterministic_and_distinct() {
        assert_eq!(
            stable_id("c1", "https://a.com/x", 0),
            stable_id("c1", "https://a.com/x", 0)
        );
        assert_ne!(
            stable_id("c1", "https://a.com/x", 0),
            stable_id("c1", "https://a.com/y", 0)
        );
        assert_ne!(
            stable_id("c1", "https://a.com/x", 0),
            stable_id("c1", "https://a.com/x", 1)
        );
        assert_ne!(
            stable_id("c1", "https://a.com/x", 0),
            stable_id("c2", "https://a.com/x", 0)
        );
    }

    proptest! {
        #[test]
        fn chunking_is_deterministic(text in ".{0,400}", size in 1usize..64, overlap_frac in 0usize..64) {
            let overlap = overlap_frac % size;
            let first = chunk_text(&text, size, overlap);
            let second = chunk_text(&text, size, overlap);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn chunks_cover_every_position(text in ".{0,400}", size in 1usize..64, overlap_frac in 0usize..64) {
            let overlap = overlap_frac % size;
            let chunks = chunk_text(&text, size, overlap);
            let stride = (size - overlap).max(1);

            // Reassembling each window's fresh region (the part past the
            // previous window's coverage) must reconstruct the input exactly.
            let mut rebuilt = String::new();
            for (i, chunk) in chunks.iter().enumerate() {
                let fresh: String = if i == 0 {
                    chunk.clone()
                } else {
                    let covered = size.saturating_sub(stride);
                    chunk.chars().skip(covered.min(chunk.chars().count())).collect()
                };
                rebuilt.push_str(&fresh);
            }
            prop_assert_eq!(rebuilt, text);
        }

        #[test]
        fn chunk_count_is_bounded(text in ".{0,400}", size in 1usize..64, overlap_frac in 0usize..64) {
            let overlap = overlap_frac % size;
            let chunks = chunk_text(&text, size, overlap);
            let stride = (size - overlap).max(1);
            let len = text.chars().count();

            // One full-size window, then one per stride over the remainder.
            let expected = if len == 0 {
                0
            } else if len <= size {
                1
            } else {
                1 + (len - size).div_ceil(stride)
            };
            prop_assert_eq!(chunks.len(), expected);
        }
    }
}
