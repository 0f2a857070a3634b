/// Deterministic pseudo-random tokens drawn from `0..vocab`.
pub fn pseudo_random_tokens(seed: u64, len: usize, vocab: u32) -> Vec<u32> {
    let vocab = u64::from(vocab.max(1));
    let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 33) % vocab) as u32
        })
        .collect()
}

/// A local change applied to a reference to simulate the model revising it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Replace `len` tokens at `at` with `with`.
    Replace { at: usize, len: usize, with: Vec<u32> },
    /// Insert `tokens` before position `at`.
    Insert { at: usize, tokens: Vec<u32> },
    /// Remove `len` tokens starting at `at`.
    Delete { at: usize, len: usize },
}

/// Copy of `reference` with `edits` applied. Positions refer to the original
/// reference; edits must be sorted by position and must not overlap.
pub fn edited_copy(reference: &[u32], edits: &[Edit]) -> Vec<u32> {
    let mut out = Vec::with_capacity(reference.len());
    let mut cursor = 0;
    for edit in edits {
        match edit {
            Edit::Replace { at, len, with } => {
                out.extend_from_slice(&reference[cursor..*at]);
                out.extend_from_slice(with);
                cursor = at + len;
            }
            Edit::Insert { at, tokens } => {
                out.extend_from_slice(&reference[cursor..*at]);
                out.extend_from_slice(tokens);
                cursor = *at;
            }
            Edit::Delete { at, len } => {
                out.extend_from_slice(&reference[cursor..*at]);
                cursor = at + len;
            }
        }
    }
    out.extend_from_slice(&reference[cursor..]);
    out
}
