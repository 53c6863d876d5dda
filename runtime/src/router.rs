//! Per-actor event routing.
//!
//! Within one actor's conversation, events must be processed in arrival
//! order: every step depends on the state the previous step persisted.
//! Between distinct actors no ordering is required. The router gives each
//! actor its own mailbox and task, which is the per-actor serialization
//! point; one slow or failing conversation never delays another.

use mealflow_core::chat::InboundEvent;
use mealflow_core::ActorId;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// How long an actor's worker waits for another event before it
/// deregisters itself and exits.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

type Mailboxes = Arc<Mutex<HashMap<ActorId, mpsc::UnboundedSender<InboundEvent>>>>;

/// Consumes one actor's events, one at a time.
///
/// Implementations handle their own errors; the router treats `handle` as
/// infallible so a failure in one actor's flow cannot ripple outward.
pub trait EventSink: Send + Sync {
    /// Processes a single inbound event to completion.
    fn handle(&self, event: InboundEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Routes inbound events to per-actor mailboxes.
///
/// Mailboxes are not kept forever: a worker that sees no event for the
/// idle timeout deregisters itself, so the map tracks recently active
/// actors rather than every actor the process has ever seen.
pub struct ActorRouter {
    sink: Arc<dyn EventSink>,
    mailboxes: Mailboxes,
    idle_timeout: Duration,
}

impl ActorRouter {
    /// Creates a router delivering to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self::with_idle_timeout(sink, IDLE_TIMEOUT)
    }

    /// Creates a router whose idle workers exit after `idle_timeout`.
    #[must_use]
    pub fn with_idle_timeout(sink: Arc<dyn EventSink>, idle_timeout: Duration) -> Self {
        Self { sink, mailboxes: Arc::new(Mutex::new(HashMap::new())), idle_timeout }
    }

    /// Number of live actor mailboxes.
    pub async fn active_mailboxes(&self) -> usize {
        self.mailboxes.lock().await.len()
    }

    /// Enqueues an event on its actor's mailbox, spawning the actor's
    /// worker task on first contact (or after an idle-out).
    pub async fn deliver(&self, event: InboundEvent) {
        let actor = event.actor;
        let mut mailboxes = self.mailboxes.lock().await;

        if let Some(tx) = mailboxes.get(&actor) {
            if tx.send(event.clone()).is_ok() {
                return;
            }
            // The worker deregisters itself before dropping its receiver,
            // so a closed sender still in the map is unexpected.
            mailboxes.remove(&actor);
            warn!(%actor, "actor mailbox was closed, respawning worker");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(actor_worker(
            actor,
            rx,
            tx.clone(),
            Arc::clone(&self.sink),
            Arc::clone(&self.mailboxes),
            self.idle_timeout,
        ));
        // The mailbox was created just above; the send cannot fail.
        let _ = tx.send(event);
        mailboxes.insert(actor, tx);
    }
}

/// Drains one actor's mailbox in arrival order. After `idle_timeout`
/// without an event the worker removes its own map entry under the lock
/// (so no send can race past the removal), drains any straggler that
/// landed in the meantime, and exits.
async fn actor_worker(
    actor: ActorId,
    mut rx: mpsc::UnboundedReceiver<InboundEvent>,
    own_tx: mpsc::UnboundedSender<InboundEvent>,
    sink: Arc<dyn EventSink>,
    mailboxes: Mailboxes,
    idle_timeout: Duration,
) {
    debug!(%actor, "actor worker started");
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(event)) => sink.handle(event).await,
            Ok(None) => break,
            Err(_) => {
                let mut map = mailboxes.lock().await;
                // A respawned worker may already own the entry.
                if map.get(&actor).is_some_and(|tx| tx.same_channel(&own_tx)) {
                    map.remove(&actor);
                }
                drop(map);
                while let Ok(event) = rx.try_recv() {
                    sink.handle(event).await;
                }
                debug!(%actor, "actor worker idled out");
                break;
            },
        }
    }
    debug!(%actor, "actor worker stopped");
}
