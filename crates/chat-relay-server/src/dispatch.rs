//! Platform event dispatch
//!
//! Connect commands run in their own task. Messages and deletions for a
//! bound thread go through that thread's lane: one task draining a FIFO
//! queue, so events for one key keep their arrival order while other keys
//! proceed independently.

use crate::controller::LifecycleController;
use crate::platform::PlatformEvent;
use chat_relay_core::ThreadId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

enum LaneEvent {
    Message { author_label: String, text: String },
    Deleted,
}

/// Routes platform events to the lifecycle controller
pub struct EventDispatcher {
    controller: Arc<LifecycleController>,
    lanes: HashMap<ThreadId, mpsc::UnboundedSender<LaneEvent>>,
}

impl EventDispatcher {
    pub fn new(controller: Arc<LifecycleController>) -> Self {
        Self {
            controller,
            lanes: HashMap::new(),
        }
    }

    /// Dispatch events until the stream ends or `shutdown` fires, then tear
    /// down every remaining session
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<PlatformEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Dispatcher shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        debug!("Platform event stream closed");
                        break;
                    }
                }
            }
        }

        self.lanes.clear();
        self.controller.shutdown().await;
    }

    /// Route one event without waiting for it to be handled
    pub fn dispatch(&mut self, event: PlatformEvent) {
        self.prune();

        match event {
            PlatformEvent::Command {
                name,
                channel,
                options,
                responder,
            } => {
                let controller = self.controller.clone();
                tokio::spawn(async move {
                    controller
                        .on_command(&name, &channel, &options, responder.as_ref())
                        .await;
                });
            }
            PlatformEvent::Message {
                thread_id,
                author_label,
                text,
                is_bot,
            } => {
                if is_bot || !self.is_live(&thread_id) {
                    return;
                }
                self.send_to_lane(thread_id, LaneEvent::Message { author_label, text });
            }
            PlatformEvent::ThreadDeleted { thread_id } => {
                if self.is_live(&thread_id) {
                    self.send_to_lane(thread_id.clone(), LaneEvent::Deleted);
                    self.lanes.remove(&thread_id);
                } else {
                    // A connect still in flight must not bind this id
                    self.controller.registry().remove(&thread_id);
                }
            }
        }
    }

    /// Number of open lanes
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    fn is_live(&self, thread_id: &ThreadId) -> bool {
        self.lanes.contains_key(thread_id) || self.controller.registry().contains(thread_id)
    }

    fn send_to_lane(&mut self, thread_id: ThreadId, event: LaneEvent) {
        let controller = &self.controller;
        let lane = self.lanes.entry(thread_id.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_lane(controller.clone(), thread_id.clone(), rx));
            tx
        });
        if lane.send(event).is_err() {
            debug!(thread = %thread_id, "Lane closed, dropping event");
        }
    }

    /// Drop lanes whose thread is no longer bound; their tasks drain and exit
    fn prune(&mut self) {
        let registry = self.controller.registry();
        self.lanes
            .retain(|thread_id, lane| !lane.is_closed() && registry.contains(thread_id));
    }
}

async fn run_lane(
    controller: Arc<LifecycleController>,
    thread_id: ThreadId,
    mut events: mpsc::UnboundedReceiver<LaneEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            LaneEvent::Message { author_label, text } => {
                // Send failures were already reported in the thread
                if let Err(e) = controller
                    .on_message(&thread_id, &author_label, &text, false)
                    .await
                {
                    debug!(thread = %thread_id, "Relay failed: {}", e);
                }
            }
            LaneEvent::Deleted => {
                controller.on_thread_deleted(&thread_id).await;
                break;
            }
        }
    }
}
