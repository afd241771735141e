// src/config.rs
// Tunables mirroring the original ACGTrie_LEARN.py's `--rows` flag and the
// resource model's growth-chunk / safety-margin defaults (spec.md S5).

/// Configuration for a [`crate::trie::Trie`] instance.
#[derive(Debug, Clone, Copy)]
pub struct TrieConfig {
    /// Rows to pre-allocate on construction.
    pub initial_capacity: usize,
    /// Rows added per growth event once free capacity drops to the margin.
    pub growth_chunk_rows: usize,
    /// Free-row margin maintained by `add_subsequence`/`add_sequence`.
    pub insert_safety_margin: usize,
    /// Free-row margin maintained while an external fragment buffer flushes
    /// a whole batch (kept larger so a batch never straddles a grow event
    /// mid-flush).
    pub batch_safety_margin: usize,
}

impl Default for TrieConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1024,
            growth_chunk_rows: 10_000_000,
            insert_safety_margin: 100,
            batch_safety_margin: 100_000,
        }
    }
}
