//! Streaming stop detection.
//!
//! [`StopBuffer`] is the state machine: text is fed one character at a time
//! and classified after each one. Only the tail that could still grow into
//! a stop is withheld; everything in front of it is released as one
//! fragment. A complete stop ends the stream. [`StopStream`] and
//! [`AsyncStopStream`] drive the same machine over an iterator and a
//! `futures::Stream`.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::Stream;
use tracing::debug;

use super::{StopMatch, StopMatcher};

/// Accumulated, not yet released text for one consumer.
#[derive(Debug, Clone)]
pub struct StopBuffer {
    matcher: StopMatcher,
    buffer: String,
    stop: Option<String>,
    finished: bool,
}

impl StopBuffer {
    pub fn new(matcher: StopMatcher) -> Self {
        Self {
            matcher,
            buffer: String::new(),
            stop: None,
            finished: false,
        }
    }

    /// Feed `fragment`, appending every fragment that became releasable to
    /// `out`. Input after a stop (or after [`finish`](Self::finish)) is
    /// ignored.
    pub fn push(&mut self, fragment: &str, out: &mut VecDeque<String>) {
        if self.is_done() {
            return;
        }
        for ch in fragment.chars() {
            self.buffer.push(ch);
            match self.matcher.classify(&self.buffer) {
                StopMatch::Prefix => {
                    let start = self.matcher.hold_start(&self.buffer).unwrap_or(0);
                    if start > 0 {
                        out.push_back(self.buffer.drain(..start).collect());
                    }
                }
                StopMatch::NotMatch => out.push_back(std::mem::take(&mut self.buffer)),
                StopMatch::Whole(matched) => {
                    let keep = self.buffer.len() - matched.len();
                    self.buffer.truncate(keep);
                    out.push_back(std::mem::take(&mut self.buffer));
                    debug!(stop = %matched, "stop sequence reached");
                    self.stop = Some(matched);
                    return;
                }
            }
        }
    }

    /// Source exhausted: release whatever is still withheld.
    pub fn finish(&mut self) -> Option<String> {
        if self.is_done() {
            return None;
        }
        self.finished = true;
        (!self.buffer.is_empty()).then(|| std::mem::take(&mut self.buffer))
    }

    /// Text currently withheld.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// The stop sequence that ended the stream, if any.
    pub fn stop_match(&self) -> Option<&str> {
        self.stop.as_deref()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_some()
    }

    fn is_done(&self) -> bool {
        self.finished || self.stop.is_some()
    }
}

/// Lazy stop-aware view over a source of text fragments.
#[derive(Debug)]
pub struct StopStream<I> {
    source: I,
    state: StopBuffer,
    ready: VecDeque<String>,
    exhausted: bool,
}

impl<I, T> StopStream<I>
where
    I: Iterator<Item = T>,
    T: AsRef<str>,
{
    pub fn new(source: I, matcher: StopMatcher) -> Self {
        Self {
            source,
            state: StopBuffer::new(matcher),
            ready: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn stop_match(&self) -> Option<&str> {
        self.state.stop_match()
    }
}

impl<I, T> Iterator for StopStream<I>
where
    I: Iterator<Item = T>,
    T: AsRef<str>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(fragment) = self.ready.pop_front() {
                return Some(fragment);
            }
            if self.exhausted || self.state.is_stopped() {
                return None;
            }
            match self.source.next() {
                Some(fragment) => self.state.push(fragment.as_ref(), &mut self.ready),
                None => {
                    self.exhausted = true;
                    return self.state.finish();
                }
            }
        }
    }
}

/// [`StopStream`] over an asynchronous source.
#[derive(Debug)]
pub struct AsyncStopStream<S> {
    source: S,
    state: StopBuffer,
    ready: VecDeque<String>,
    exhausted: bool,
}

impl<S, T> AsyncStopStream<S>
where
    S: Stream<Item = T> + Unpin,
    T: AsRef<str>,
{
    pub fn new(source: S, matcher: StopMatcher) -> Self {
        Self {
            source,
            state: StopBuffer::new(matcher),
            ready: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn stop_match(&self) -> Option<&str> {
        self.state.stop_match()
    }
}

impl<S, T> Stream for AsyncStopStream<S>
where
    S: Stream<Item = T> + Unpin,
    T: AsRef<str>,
{
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let this = self.get_mut();
        loop {
            if let Some(fragment) = this.ready.pop_front() {
                return Poll::Ready(Some(fragment));
            }
            if this.exhausted || this.state.is_stopped() {
                return Poll::Ready(None);
            }
            match ready!(Pin::new(&mut this.source).poll_next(cx)) {
                Some(fragment) => this.state.push(fragment.as_ref(), &mut this.ready),
                None => {
                    this.exhausted = true;
                    return Poll::Ready(this.state.finish());
                }
            }
        }
    }
}

/// Wrap `source` so output stops at the first complete stop sequence.
pub fn stream_stop<I, T, S>(source: I, patterns: &[S]) -> StopStream<I::IntoIter>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
    S: AsRef<str>,
{
    StopStream::new(source.into_iter(), StopMatcher::new(patterns))
}
