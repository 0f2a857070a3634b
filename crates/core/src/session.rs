//! Per-request reference sessions.
//!
//! A session ties one in-flight request to its reference sequence and a
//! matcher over it. Sessions live in a concurrent map keyed by request id,
//! each behind its own mutex. The map's shard lock is only held long enough
//! to clone the session handle, so matching one request never blocks
//! lookups of other requests on the same shard.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SpecEditConfig;
use crate::matcher::{build_matcher, MatcherBackend, MatcherConfig, ReferenceMatcher};

/// Opaque request key assigned by the host engine.
pub type RequestId = String;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} already exists")]
    AlreadyExists(RequestId),

    #[error("session {0} not found")]
    NotFound(RequestId),

    #[error("generated sequence of session {request_id} was rewound: {stored} tokens stored, received {received} that do not extend them")]
    SequenceRewound {
        request_id: RequestId,
        stored: usize,
        received: usize,
    },

    #[error("session {0} was dropped after a matcher panic")]
    Poisoned(RequestId),
}

/// Shared handle to one session.
pub type SharedSession = Arc<Mutex<ReferenceSession>>;

/// One request's reference and matcher state.
#[derive(Debug)]
pub struct ReferenceSession {
    request_id: RequestId,
    reference: Arc<[u32]>,
    generated: Vec<u32>,
    matcher: Box<dyn ReferenceMatcher>,
    created_seq: u64,
}

impl ReferenceSession {
    pub fn new(
        request_id: RequestId,
        reference: Arc<[u32]>,
        backend: MatcherBackend,
        config: &MatcherConfig,
        created_seq: u64,
    ) -> Self {
        let matcher = build_matcher(backend, Arc::clone(&reference), config);
        Self {
            request_id,
            reference,
            generated: Vec::new(),
            matcher,
            created_seq,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn reference(&self) -> &[u32] {
        &self.reference
    }

    /// Generated tokens seen so far.
    pub fn generated(&self) -> &[u32] {
        &self.generated
    }

    pub fn backend(&self) -> MatcherBackend {
        self.matcher.backend()
    }

    pub fn created_seq(&self) -> u64 {
        self.created_seq
    }

    /// Record `generated` and ask the matcher for the next chunk.
    ///
    /// `generated` must extend what previous calls passed. Only the length
    /// and the last stored token are compared, so the check costs nothing
    /// for long histories; the matchers re-verify their own window.
    pub fn next_chunk(&mut self, generated: &[u32], max_len: usize) -> Result<Vec<u32>, SessionError> {
        if !self.is_extended_by(generated) {
            return Err(SessionError::SequenceRewound {
                request_id: self.request_id.clone(),
                stored: self.generated.len(),
                received: generated.len(),
            });
        }
        self.generated.extend_from_slice(&generated[self.generated.len()..]);
        Ok(self.matcher.next_chunk(&self.generated, max_len))
    }

    fn is_extended_by(&self, generated: &[u32]) -> bool {
        let stored = self.generated.len();
        match stored.checked_sub(1) {
            None => true,
            Some(last) => generated.len() >= stored && generated[last] == self.generated[last],
        }
    }

    /// Forget generated tokens and matcher state; the reference stays.
    pub fn restart(&mut self) {
        self.generated.clear();
        self.matcher.reset();
    }
}

#[derive(Debug)]
struct Slot {
    /// Copy of the session's sequence number, readable without its lock.
    created_seq: u64,
    session: SharedSession,
}

/// Concurrent map of live sessions with a capacity bound.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<RequestId, Slot>,
    backend: MatcherBackend,
    matcher_config: MatcherConfig,
    max_sessions: usize,
    next_seq: AtomicU64,
}

impl SessionRegistry {
    pub fn new(backend: MatcherBackend, matcher_config: MatcherConfig, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            backend,
            matcher_config,
            max_sessions: max_sessions.max(1),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Registry for an already [`resolved`](SpecEditConfig::resolved) config.
    pub fn from_config(config: &SpecEditConfig) -> Self {
        Self::new(config.backend, config.matcher, config.max_sessions)
    }

    pub fn backend(&self) -> MatcherBackend {
        self.backend
    }

    /// Start a session. Evicts the oldest session when the registry is full.
    pub fn create(
        &self,
        request_id: impl Into<RequestId>,
        reference: impl Into<Arc<[u32]>>,
    ) -> Result<(), SessionError> {
        let request_id = request_id.into();
        if self.sessions.contains_key(&request_id) {
            return Err(SessionError::AlreadyExists(request_id));
        }
        // before entry(): eviction needs shard locks the entry guard would hold
        self.evict_if_full();

        match self.sessions.entry(request_id) {
            Entry::Occupied(entry) => Err(SessionError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                let created_seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                let session = ReferenceSession::new(
                    entry.key().clone(),
                    reference.into(),
                    self.backend,
                    &self.matcher_config,
                    created_seq,
                );
                debug!(
                    request_id = %entry.key(),
                    reference_len = session.reference().len(),
                    backend = %self.backend,
                    "session created"
                );
                entry.insert(Slot {
                    created_seq,
                    session: Arc::new(Mutex::new(session)),
                });
                Ok(())
            }
        }
    }

    /// Handle to the session under `request_id`. The registry is not locked
    /// while the handle is held.
    pub fn session(&self, request_id: &str) -> Option<SharedSession> {
        self.sessions
            .get(request_id)
            .map(|slot| Arc::clone(&slot.session))
    }

    /// Run `f` on the session under `request_id` with only that session
    /// locked. A session poisoned by a panicking matcher is dropped.
    pub fn with_session<T>(
        &self,
        request_id: &str,
        f: impl FnOnce(&mut ReferenceSession) -> T,
    ) -> Result<T, SessionError> {
        let handle = self
            .session(request_id)
            .ok_or_else(|| SessionError::NotFound(request_id.to_string()))?;
        let result = match handle.lock() {
            Ok(mut session) => Ok(f(&mut session)),
            Err(_) => Err(SessionError::Poisoned(request_id.to_string())),
        };
        if result.is_err() {
            warn!(request_id, "session poisoned by a matcher panic, dropping it");
            self.sessions
                .remove_if(request_id, |_, slot| Arc::ptr_eq(&slot.session, &handle));
        }
        result
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.sessions.contains_key(request_id)
    }

    /// Drop a session. Removing an unknown id is not an error.
    pub fn remove(&self, request_id: &str) -> bool {
        let removed = self.sessions.remove(request_id).is_some();
        if removed {
            debug!(request_id, "session removed");
        }
        removed
    }

    /// Rebuild a session's matcher state from its stored reference.
    pub fn recreate(&self, request_id: &str) -> Result<(), SessionError> {
        self.with_session(request_id, ReferenceSession::restart)?;
        debug!(request_id, "session recreated");
        Ok(())
    }

    /// [`ReferenceSession::next_chunk`] for the session under `request_id`.
    pub fn next_chunk(
        &self,
        request_id: &str,
        generated: &[u32],
        max_len: usize,
    ) -> Result<Vec<u32>, SessionError> {
        self.with_session(request_id, |session| session.next_chunk(generated, max_len))?
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }

    fn evict_if_full(&self) {
        while self.sessions.len() >= self.max_sessions {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|slot| slot.created_seq)
                .map(|slot| slot.key().clone());
            let Some(oldest) = oldest else {
                break;
            };
            if self.sessions.remove(&oldest).is_some() {
                warn!(
                    request_id = %oldest,
                    max_sessions = self.max_sessions,
                    "session registry full, evicted oldest session"
                );
            }
        }
    }
}
