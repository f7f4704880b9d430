//! In-memory collaborators for driving the relay without a network

use crate::platform::{ChatPlatform, CommandResponder};
use crate::remote::{EventListener, RemoteConnector, RemoteEvent, RemoteSession};
use async_trait::async_trait;
use chat_relay_core::{BridgeError, ChannelId, RemoteAddress, Result, ThreadId};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct FakeRemote {
    address: RemoteAddress,
    slot_name: String,
    pub sent: Mutex<Vec<String>>,
    pub fail_send: AtomicBool,
    pub disconnects: AtomicUsize,
    listener: Mutex<Option<EventListener>>,
}

impl FakeRemote {
    pub fn new(address: RemoteAddress, slot_name: &str) -> Arc<Self> {
        Arc::new(Self {
            address,
            slot_name: slot_name.to_string(),
            sent: Mutex::new(Vec::new()),
            fail_send: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
            listener: Mutex::new(None),
        })
    }

    /// Push an event to whichever listener is installed
    pub fn emit(&self, event: RemoteEvent) -> bool {
        match self.listener.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSession for FakeRemote {
    fn address(&self) -> &RemoteAddress {
        &self.address
    }

    fn slot_name(&self) -> &str {
        &self.slot_name
    }

    async fn send_chat(&self, text: &str) -> Result<()> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(BridgeError::Send("socket closed".into()));
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    fn on_event(&self, listener: EventListener) {
        *self.listener.lock() = Some(listener);
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.listener.lock().take();
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub fail_with: Mutex<Option<String>>,
    pub sessions: Mutex<Vec<Arc<FakeRemote>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        let connector = Self::default();
        *connector.fail_with.lock() = Some(reason.to_string());
        Arc::new(connector)
    }

    pub fn last(&self) -> Arc<FakeRemote> {
        self.sessions
            .lock()
            .last()
            .cloned()
            .expect("no session was opened")
    }
}

#[async_trait]
impl RemoteConnector for FakeConnector {
    async fn connect(
        &self,
        address: &RemoteAddress,
        slot_name: &str,
    ) -> Result<Arc<dyn RemoteSession>> {
        if let Some(reason) = self.fail_with.lock().clone() {
            return Err(BridgeError::Connection(reason));
        }
        let remote = FakeRemote::new(address.clone(), slot_name);
        self.sessions.lock().push(remote.clone());
        Ok(remote)
    }
}

/// Runs right after a thread is created, before `create_thread` returns
pub type CreateHook = Box<dyn Fn(&ThreadId) + Send + Sync>;

#[derive(Default)]
pub struct FakePlatform {
    next_id: AtomicUsize,
    pub fail_create: AtomicBool,
    pub on_create: Mutex<Option<CreateHook>>,
    pub threads: Mutex<Vec<(ChannelId, String, String, ThreadId)>>,
    pub posts: Mutex<Vec<(ThreadId, String)>>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn posts_in(&self, thread_id: &ThreadId) -> Vec<String> {
        self.posts
            .lock()
            .iter()
            .filter(|(t, _)| t == thread_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn create_thread(
        &self,
        parent: &ChannelId,
        name: &str,
        reason: &str,
    ) -> Result<ThreadId> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BridgeError::ThreadCreation("missing permissions".into()));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = ThreadId::new(format!("thread-{}", n + 1));
        self.threads
            .lock()
            .push((parent.clone(), name.to_string(), reason.to_string(), id.clone()));
        if let Some(hook) = self.on_create.lock().as_ref() {
            hook(&id);
        }
        Ok(id)
    }

    async fn send_to_thread(&self, thread_id: &ThreadId, text: &str) -> Result<()> {
        self.posts.lock().push((thread_id.clone(), text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeResponder {
    pub deferred: AtomicBool,
    pub responses: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl CommandResponder for FakeResponder {
    async fn defer(&self) -> Result<()> {
        self.deferred.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn respond(&self, text: &str) -> Result<()> {
        self.responses.lock().push(text.to_string());
        Ok(())
    }
}
