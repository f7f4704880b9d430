//! Session registry: thread id -> bound relay session

use crate::channel::RelayChannel;
use crate::remote::RemoteSession;
use chat_relay_core::{RemoteAddress, SessionState, ThreadId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A thread bound to a remote session
pub struct Session {
    pub thread_id: ThreadId,
    pub remote_address: RemoteAddress,
    pub slot_name: String,
    channel: Arc<RelayChannel>,
    /// Cancels the inbound pump at teardown
    subscription: CancellationToken,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(channel: Arc<RelayChannel>, subscription: CancellationToken) -> Self {
        let handle = channel.handle();
        Self {
            thread_id: channel.thread_id().clone(),
            remote_address: handle.address().clone(),
            slot_name: handle.slot_name().to_string(),
            channel,
            subscription,
            state: Mutex::new(SessionState::Connecting),
        }
    }

    pub fn channel(&self) -> &Arc<RelayChannel> {
        &self.channel
    }

    pub fn handle(&self) -> &Arc<dyn RemoteSession> {
        self.channel.handle()
    }

    pub fn subscription(&self) -> &CancellationToken {
        &self.subscription
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.state.lock();
        debug_assert!(state.can_transition_to(next), "{:?} -> {:?}", *state, next);
        *state = next;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("thread_id", &self.thread_id)
            .field("remote_address", &self.remote_address)
            .field("slot_name", &self.slot_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<ThreadId, Arc<Session>>,
    /// Thread ids that were bound, torn down, and may never be bound again
    retired: HashSet<ThreadId>,
    /// Connects that have not bound yet
    in_flight: usize,
    /// Unknown threads deleted while a connect was in flight
    orphaned: HashSet<ThreadId>,
}

/// Registry of bound sessions.
///
/// Every operation takes the lock once and never awaits while holding it.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce a connect that may bind a thread it is still creating.
    ///
    /// While any guard is alive, deletions of unknown threads are remembered
    /// so a late bind of that thread fails.
    pub fn begin_bind(&self) -> BindGuard<'_> {
        self.inner.lock().in_flight += 1;
        BindGuard { registry: self }
    }

    /// Bind a session to its thread
    pub fn create(&self, session: Session) -> Result<Arc<Session>, RegistryError> {
        let mut inner = self.inner.lock();
        let thread_id = session.thread_id.clone();

        if inner.orphaned.contains(&thread_id) || inner.retired.contains(&thread_id) {
            return Err(RegistryError::Retired(thread_id));
        }
        if inner.sessions.contains_key(&thread_id) {
            return Err(RegistryError::AlreadyBound(thread_id));
        }

        session.transition(SessionState::Bound);
        let session = Arc::new(session);
        inner.sessions.insert(thread_id, session.clone());
        Ok(session)
    }

    /// Look up the session bound to a thread
    pub fn get(&self, thread_id: &ThreadId) -> Option<Arc<Session>> {
        self.inner.lock().sessions.get(thread_id).cloned()
    }

    /// Unbind a thread. Idempotent.
    ///
    /// A bound thread is retired. An unknown thread is only remembered while
    /// a connect is in flight.
    pub fn remove(&self, thread_id: &ThreadId) -> Option<Arc<Session>> {
        let mut inner = self.inner.lock();
        match inner.sessions.remove(thread_id) {
            Some(session) => {
                inner.retired.insert(thread_id.clone());
                session.transition(SessionState::Unbound);
                Some(session)
            }
            None => {
                if inner.in_flight > 0 {
                    inner.orphaned.insert(thread_id.clone());
                }
                None
            }
        }
    }

    /// Whether a thread is currently bound
    pub fn contains(&self, thread_id: &ThreadId) -> bool {
        self.inner.lock().sessions.contains_key(thread_id)
    }

    /// Ids of all bound threads
    pub fn thread_ids(&self) -> Vec<ThreadId> {
        self.inner.lock().sessions.keys().cloned().collect()
    }

    /// Number of bound sessions
    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn tracked_ids(&self) -> usize {
        let inner = self.inner.lock();
        inner.retired.len() + inner.orphaned.len()
    }
}

/// Keeps late deletions visible to an in-flight connect; see
/// [`SessionRegistry::begin_bind`]
pub struct BindGuard<'a> {
    registry: &'a SessionRegistry,
}

impl Drop for BindGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.registry.inner.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if inner.in_flight == 0 {
            inner.orphaned.clear();
        }
    }
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Thread already bound: {0}")]
    AlreadyBound(ThreadId),
    #[error("Thread was torn down and cannot be rebound: {0}")]
    Retired(ThreadId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePlatform, FakeRemote};
    use proptest::prelude::*;

    fn session(thread: &str) -> Session {
        let remote = FakeRemote::new(RemoteAddress::new("example.com", 38281), "Runner");
        let channel = RelayChannel::new(
            ThreadId::new(thread),
            remote,
            FakePlatform::new(),
            "TreZapalooza",
        );
        Session::new(Arc::new(channel), CancellationToken::new())
    }

    #[test]
    fn test_create_and_get() {
        let registry = SessionRegistry::new();
        let created = registry.create(session("t1")).unwrap();

        assert_eq!(created.state(), SessionState::Bound);
        assert_eq!(created.remote_address.to_string(), "example.com:38281");
        assert_eq!(created.slot_name, "Runner");

        let found = registry.get(&ThreadId::new("t1")).unwrap();
        assert!(Arc::ptr_eq(&created, &found));
        assert!(registry.get(&ThreadId::new("t2")).is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = SessionRegistry::new();
        registry.create(session("t1")).unwrap();

        let err = registry.create(session("t1")).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyBound(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_idempotent() {
        let registry = SessionRegistry::new();
        registry.create(session("t1")).unwrap();
        registry.create(session("t2")).unwrap();

        let removed = registry.remove(&ThreadId::new("t1")).unwrap();
        assert_eq!(removed.state(), SessionState::Unbound);
        assert!(registry.remove(&ThreadId::new("t1")).is_none());

        assert_eq!(registry.thread_ids(), vec![ThreadId::new("t2")]);
        assert!(!registry.contains(&ThreadId::new("t1")));
    }

    #[test]
    fn test_retired_thread_stays_unbound() {
        let registry = SessionRegistry::new();
        registry.create(session("t1")).unwrap();
        registry.remove(&ThreadId::new("t1"));

        let err = registry.create(session("t1")).unwrap_err();
        assert!(matches!(err, RegistryError::Retired(_)));

    }

    #[test]
    fn test_unrelated_deletions_leave_no_trace() {
        let registry = SessionRegistry::new();
        for i in 0..10_000 {
            assert!(registry.remove(&ThreadId::new(format!("other-{}", i))).is_none());
        }
        assert_eq!(registry.tracked_ids(), 0);

        // A thread id seen only in a deletion can still be bound later
        registry.create(session("other-7")).unwrap();
    }

    #[test]
    fn test_deleted_during_bind() {
        let registry = SessionRegistry::new();
        let guard = registry.begin_bind();
        assert!(registry.remove(&ThreadId::new("t1")).is_none());

        let err = registry.create(session("t1")).unwrap_err();
        assert!(matches!(err, RegistryError::Retired(_)));
        registry.create(session("t2")).unwrap();

        drop(guard);
        assert_eq!(registry.tracked_ids(), 0);
        registry.create(session("t1")).unwrap();
    }

    #[test]
    fn test_overlapping_binds() {
        let registry = SessionRegistry::new();
        let first = registry.begin_bind();
        let second = registry.begin_bind();
        registry.remove(&ThreadId::new("t1"));

        drop(first);
        assert!(registry.create(session("t1")).is_err());
        drop(second);
        assert_eq!(registry.tracked_ids(), 0);
    }

    #[test]
    fn test_session_debug() {
        let text = format!("{:?}", session("t1"));
        assert!(text.contains("Session"));
        assert!(text.contains("example.com"));
        assert!(text.contains("Connecting"));
    }

    #[tokio::test]
    async fn test_concurrent_create_single_winner() {
        let registry = Arc::new(SessionRegistry::new());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.create(session("contested")).is_ok()
            }));
        }

        let mut wins = 0;
        for task in tasks {
            if task.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(registry.len(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create(u8),
        Remove(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4).prop_map(Op::Create),
            (0u8..4).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_at_most_one_session_per_key(ops in proptest::collection::vec(op(), 1..64)) {
            let registry = SessionRegistry::new();
            let mut bound: HashSet<u8> = HashSet::new();
            let mut retired: HashSet<u8> = HashSet::new();

            for op in ops {
                match op {
                    Op::Create(k) => {
                        let ok = registry.create(session(&k.to_string())).is_ok();
                        prop_assert_eq!(ok, !bound.contains(&k) && !retired.contains(&k));
                        if ok {
                            bound.insert(k);
                        }
                    }
                    Op::Remove(k) => {
                        let removed = registry.remove(&ThreadId::new(k.to_string())).is_some();
                        prop_assert_eq!(removed, bound.remove(&k));
                        if removed {
                            retired.insert(k);
                        }
                    }
                }
                prop_assert_eq!(registry.len(), bound.len());
                let keys: HashSet<ThreadId> = registry.thread_ids().into_iter().collect();
                prop_assert_eq!(keys.len(), registry.len());
                prop_assert_eq!(registry.tracked_ids(), retired.len());
            }
        }
    }
}
