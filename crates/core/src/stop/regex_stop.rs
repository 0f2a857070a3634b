//! Regex stop patterns evaluated in partial-match mode.
//!
//! The pattern is compiled to an anchored dense DFA. For every candidate
//! start offset the DFA is walked to the end of the text:
//!
//! - end-of-input transition lands in a match state: the pattern matches
//!   exactly `text[start..]` (`Whole`)
//! - the state can still reach a match on more input: `Prefix`
//! - the walk hits a dead or quit state: try the next start offset
//!
//! Any start offset reaching `Whole` decides; otherwise one live offset is
//! enough for `Prefix`. A second, ordinary `regex::Regex` answers
//! leftmost-search queries for trimming.

use std::sync::Arc;

use regex::Regex;
use regex_automata::dfa::dense::DFA;
use regex_automata::dfa::{Automaton, StartKind};
use regex_automata::util::primitives::StateID;
use regex_automata::util::start;
use regex_automata::Anchored;
use tracing::warn;

use super::StopMatch;

#[derive(Debug)]
struct Compiled {
    dfa: DFA<Vec<u32>>,
    search: Regex,
}

/// A compiled `r/<regex>/` stop pattern.
///
/// A pattern that fails to compile is kept (so pattern order and counts are
/// stable) but never matches.
#[derive(Debug, Clone)]
pub struct RegexStop {
    source: String,
    compiled: Option<Arc<Compiled>>,
}

impl RegexStop {
    /// Compile `pattern`. Failures are logged once, here.
    pub fn compile(pattern: &str) -> Self {
        let compiled = match Self::build(pattern) {
            Ok(compiled) => Some(Arc::new(compiled)),
            Err(e) => {
                warn!(pattern, error = %e, "invalid regex stop pattern, it will never match");
                None
            }
        };
        Self {
            source: pattern.to_string(),
            compiled,
        }
    }

    fn build(pattern: &str) -> Result<Compiled, String> {
        let dfa = DFA::builder()
            .configure(
                DFA::config()
                    .start_kind(StartKind::Anchored)
                    .unicode_word_boundary(true),
            )
            .build(pattern)
            .map_err(|e| e.to_string())?;
        let search = Regex::new(pattern).map_err(|e| e.to_string())?;
        Ok(Compiled { dfa, search })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.compiled.is_some()
    }

    /// Partial-match classification of `text`. A start offset whose match
    /// reaches the end wins over any earlier offset that is still live.
    pub fn classify(&self, text: &str) -> StopMatch {
        let Some(compiled) = &self.compiled else {
            return StopMatch::NotMatch;
        };

        let mut prefix = false;
        for (start, _) in text.char_indices() {
            match reach(&compiled.dfa, text, start) {
                Reach::Whole => return StopMatch::Whole(text[start..].to_string()),
                Reach::Live => prefix = true,
                Reach::Dead => {}
            }
        }
        if prefix {
            StopMatch::Prefix
        } else {
            StopMatch::NotMatch
        }
    }

    /// Leftmost start offset that is not dead.
    pub fn hold_start(&self, text: &str) -> Option<usize> {
        let compiled = self.compiled.as_ref()?;
        text.char_indices()
            .map(|(start, _)| start)
            .find(|&start| reach(&compiled.dfa, text, start) != Reach::Dead)
    }

    /// Byte offset of the leftmost match in `text`.
    pub fn find_start(&self, text: &str) -> Option<usize> {
        self.compiled
            .as_ref()
            .and_then(|compiled| compiled.search.find(text))
            .map(|m| m.start())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reach {
    Dead,
    Live,
    Whole,
}

/// Where an anchored walk from `start` to the end of `text` lands.
fn reach(dfa: &DFA<Vec<u32>>, text: &str, start: usize) -> Reach {
    let bytes = text.as_bytes();
    let config = start::Config::new()
        .anchored(Anchored::Yes)
        .look_behind(start.checked_sub(1).map(|i| bytes[i]));
    let Ok(mut state) = dfa.start_state(&config) else {
        return Reach::Dead;
    };
    if !walk(dfa, &mut state, &bytes[start..]) {
        return Reach::Dead;
    }
    if dfa.is_match_state(dfa.next_eoi_state(state)) {
        Reach::Whole
    } else if can_reach_match(dfa, state) {
        Reach::Live
    } else {
        Reach::Dead
    }
}

/// Feed `input` through the DFA. Returns false once the state is dead or
/// the DFA gave up (quit byte).
fn walk(dfa: &DFA<Vec<u32>>, state: &mut StateID, input: &[u8]) -> bool {
    for &byte in input {
        *state = dfa.next_state(*state, byte);
        if dfa.is_dead_state(*state) || dfa.is_quit_state(*state) {
            return false;
        }
    }
    true
}

/// Whether some further input can still lead to a match from `state`.
fn can_reach_match(dfa: &DFA<Vec<u32>>, state: StateID) -> bool {
    (0..=u8::MAX).any(|byte| {
        let next = dfa.next_state(state, byte);
        !dfa.is_dead_state(next) && !dfa.is_quit_state(next)
    })
}
