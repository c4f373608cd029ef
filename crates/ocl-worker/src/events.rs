//! Fire-and-forget delivery of store events to async consumers.

use ocl_core::{ContentEvent, EventHook};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Forwards every store event into an unbounded channel.
///
/// Sending never blocks. Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelEventHook {
    sender: UnboundedSender<ContentEvent>,
}

impl ChannelEventHook {
    /// Creates a hook and the receiving end of its channel.
    pub fn channel() -> (Self, UnboundedReceiver<ContentEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventHook for ChannelEventHook {
    fn on_event(&self, event: &ContentEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!("event receiver closed; dropping event");
        }
    }
}

/// Spawns a task that logs events until every sender is dropped.
///
/// Resolves to the number of events seen.
pub fn spawn_event_logger(mut receiver: UnboundedReceiver<ContentEvent>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut seen = 0;
        while let Some(event) = receiver.recv().await {
            seen += 1;
            log_event(&event);
        }
        seen
    })
}

fn log_event(event: &ContentEvent) {
    match event {
        ContentEvent::RepositoryCreated { uri, .. } => info!(%uri, "Repository created"),
        ContentEvent::RepositoryDeleted { uri, actor, .. } => info!(%uri, %actor, "Repository deleted"),
        ContentEvent::VersionCut { version, label, .. } => info!(%version, %label, "Version cut"),
        ContentEvent::ContentWritten { uri, .. } => debug!(%uri, "Content written"),
        ContentEvent::ReferencesChanged {
            collection_version,
            added,
            removed,
        } => info!(version = %collection_version, added, removed, "References changed"),
        ContentEvent::ExpansionComputed {
            expansion, members, ..
        } => info!(%expansion, members, "Expansion computed"),
    }
}
