//! Sliding-window planning shared by every matcher backend.
//!
//! Matching the whole generated sequence against the whole reference on
//! every decoding step is too slow at conversational context lengths, so
//! once the generated sequence grows past the window length both sides are
//! trimmed. The trim boundary moves in whole-window steps: the retained
//! generated tail always holds between `window` and `2 * window` tokens, and
//! backend indexes only need rebuilding when the boundary moves.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Window sizing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window length is `reference_len / divisor` (at least 1).
    pub divisor: usize,
    /// Windows shorter than this are never applied; short references are
    /// always matched in full.
    pub min_window: usize,
    /// Length of the reference window as a multiple of the window length.
    pub reference_factor: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            divisor: 15,
            min_window: 100,
            reference_factor: 4,
        }
    }
}

impl WindowConfig {
    /// Window length for a reference of the given length. Zero means
    /// windowing is impossible (empty reference or zero divisor).
    pub fn window_len(&self, reference_len: usize) -> usize {
        if reference_len == 0 || self.divisor == 0 {
            return 0;
        }
        (reference_len / self.divisor).max(1)
    }

    /// Compute which slices of the reference and generated sequences a
    /// backend should match for the current step.
    pub fn plan(&self, reference_len: usize, generated_len: usize) -> WindowPlan {
        let window = self.window_len(reference_len);
        if window == 0 || window < self.min_window || generated_len < window {
            return WindowPlan::full(reference_len);
        }

        let generated_start = ((generated_len - window) / window) * window;
        let reference_start = generated_start.saturating_sub(window).min(reference_len);
        let reference_end =
            (reference_start + window * self.reference_factor.max(1)).min(reference_len);

        WindowPlan {
            generated_start,
            reference: reference_start..reference_end,
        }
    }
}

/// Slices selected for one matching step.
///
/// `generated_start` is the offset of the retained generated tail; the tail
/// always runs to the end of the generated sequence. `reference` is the
/// retained reference range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    pub generated_start: usize,
    pub reference: Range<usize>,
}

impl WindowPlan {
    /// A plan that keeps both sequences whole.
    pub fn full(reference_len: usize) -> Self {
        Self {
            generated_start: 0,
            reference: 0..reference_len,
        }
    }

    /// Whether this plan trims anything.
    pub fn is_windowed(&self, reference_len: usize) -> bool {
        self.generated_start > 0 || self.reference != (0..reference_len)
    }

    /// The reference slice this plan keeps.
    pub fn reference_slice<'a>(&self, reference: &'a [u32]) -> &'a [u32] {
        &reference[self.reference.start.min(reference.len())..self.reference.end.min(reference.len())]
    }

    /// The generated slice this plan keeps.
    pub fn generated_slice<'a>(&self, generated: &'a [u32]) -> &'a [u32] {
        &generated[self.generated_start.min(generated.len())..]
    }
}
