//! Stop-sequence matching over streamed text.
//!
//! A stop pattern is either a literal string or a regular expression written
//! as `r/<regex>/`. [`StopMatcher::classify`] looks at the text accumulated
//! since the last flush and says whether it ends a stop sequence
//! ([`StopMatch::Whole`]), might still grow into one ([`StopMatch::Prefix`]),
//! or can safely be released ([`StopMatch::NotMatch`]). [`stream_stop`]
//! drives that decision over a stream of fragments.

mod regex_stop;
mod stream;

pub use regex_stop::RegexStop;
pub use stream::{stream_stop, AsyncStopStream, StopBuffer, StopStream};

/// Outcome of classifying accumulated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopMatch {
    /// Nothing can stop here; the text may be flushed.
    NotMatch,
    /// The text could still grow into a stop sequence; withhold it.
    Prefix,
    /// The text ends with this complete stop sequence.
    Whole(String),
}

impl StopMatch {
    pub fn is_whole(&self) -> bool {
        matches!(self, Self::Whole(_))
    }
}

/// One compiled stop pattern.
#[derive(Debug, Clone)]
pub enum StopPattern {
    Literal(String),
    Regex(RegexStop),
}

impl StopPattern {
    /// Parse a pattern. Empty patterns yield `None`.
    pub fn parse(pattern: &str) -> Option<Self> {
        if pattern.is_empty() {
            return None;
        }
        match regex_body(pattern) {
            Some(body) => Some(Self::Regex(RegexStop::compile(body))),
            None => Some(Self::Literal(pattern.to_string())),
        }
    }

    pub fn classify(&self, text: &str) -> StopMatch {
        match self {
            Self::Literal(literal) => {
                if text.ends_with(literal.as_str()) {
                    StopMatch::Whole(literal.clone())
                } else if literal_hold_start(literal, text).is_some() {
                    StopMatch::Prefix
                } else {
                    StopMatch::NotMatch
                }
            }
            Self::Regex(regex) => regex.classify(text),
        }
    }

    /// Byte offset of the earliest suffix of `text` that could still grow
    /// into this pattern. Everything before it can be released.
    pub fn hold_start(&self, text: &str) -> Option<usize> {
        match self {
            Self::Literal(literal) => literal_hold_start(literal, text),
            Self::Regex(regex) => regex.hold_start(text),
        }
    }

    /// Byte offset of the first occurrence in `text`.
    pub fn find_start(&self, text: &str) -> Option<usize> {
        match self {
            Self::Literal(literal) => text.find(literal.as_str()),
            Self::Regex(regex) => regex.find_start(text),
        }
    }
}

fn literal_hold_start(literal: &str, text: &str) -> Option<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .find(|&i| literal.starts_with(&text[i..]))
}

/// `r/<regex>/` → `<regex>`.
fn regex_body(pattern: &str) -> Option<&str> {
    if pattern.len() > 3 && pattern.starts_with("r/") && pattern.ends_with('/') {
        Some(&pattern[2..pattern.len() - 1])
    } else {
        None
    }
}

/// A compiled, ordered set of stop patterns.
#[derive(Debug, Clone, Default)]
pub struct StopMatcher {
    patterns: Vec<StopPattern>,
}

impl StopMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .filter_map(|p| StopPattern::parse(p.as_ref()))
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[StopPattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Classify `text` against every pattern. The first `Whole` wins, then
    /// any `Prefix`, otherwise `NotMatch`.
    pub fn classify(&self, text: &str) -> StopMatch {
        if text.is_empty() {
            return StopMatch::NotMatch;
        }
        let mut prefix = false;
        for pattern in &self.patterns {
            match pattern.classify(text) {
                whole @ StopMatch::Whole(_) => return whole,
                StopMatch::Prefix => prefix = true,
                StopMatch::NotMatch => {}
            }
        }
        if prefix {
            StopMatch::Prefix
        } else {
            StopMatch::NotMatch
        }
    }

    /// Earliest offset in `text` from which any pattern could still
    /// complete. `None` when the whole text is safe to release.
    pub fn hold_start(&self, text: &str) -> Option<usize> {
        self.patterns.iter().filter_map(|p| p.hold_start(text)).min()
    }

    /// Cut `text` at the earliest offset where any pattern matches.
    pub fn trim<'a>(&self, text: &'a str) -> &'a str {
        match self.patterns.iter().filter_map(|p| p.find_start(text)).min() {
            Some(start) => &text[..start],
            None => text,
        }
    }
}

/// One-shot [`StopMatcher::classify`]. Prefer building a [`StopMatcher`]
/// once when classifying repeatedly.
pub fn classify<S: AsRef<str>>(text: &str, patterns: &[S]) -> StopMatch {
    StopMatcher::new(patterns).classify(text)
}

/// One-shot [`StopMatcher::trim`].
pub fn trim_last_stop<'a, S: AsRef<str>>(text: &'a str, patterns: &[S]) -> &'a str {
    StopMatcher::new(patterns).trim(text)
}
