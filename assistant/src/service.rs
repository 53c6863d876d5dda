//! Wiring: the event sink, startup recovery, and the public assistant
//! handle.
//!
//! The one rule enforced here rather than in the flows: the next
//! conversation state is persisted *before* any reply is sent. If the
//! process dies between the two, the user sees a missing reply and their
//! next message resumes from the already-persisted step; the other order
//! would silently fork the conversation.

use crate::config::Config;
use crate::machine::state::ConversationState;
use crate::machine::{self, AssistantEnv};
use crate::notify::{restore_scheduled_orders, NotificationDispatcher};
use crate::state_store::StateStore;
use mealflow_core::chat::{ChatTransport, InboundEvent};
use mealflow_core::environment::{Clock, MediaStore};
use mealflow_core::store::DurableStore;
use mealflow_runtime::{ActorRouter, EventSink, Scheduler, SchedulerWorker};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Installs the global tracing subscriber with `filter` (falling back to
/// `info` if the directive does not parse). Safe to call more than once.
pub fn init_tracing(filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Per-actor event processor: load state, run the machine, persist,
/// reply.
struct AssistantSink {
    env: Arc<AssistantEnv>,
    states: StateStore,
    transport: Arc<dyn ChatTransport>,
}

impl AssistantSink {
    async fn process(&self, event: InboundEvent) {
        let actor = event.actor;
        let state = match self.states.load(actor).await {
            Ok(state) => state,
            Err(e) => {
                error!(%actor, error = %e, "could not load conversation state");
                return;
            },
        };

        let transition = match machine::handle_event(&self.env, state, &event).await {
            Ok(transition) => transition,
            Err(e) => {
                error!(%actor, error = %e, "flow failed");
                if let Err(send_err) = self
                    .transport
                    .send(
                        actor,
                        mealflow_core::chat::OutboundMessage::text(
                            "Something went wrong on my end. Please try again.",
                        ),
                    )
                    .await
                {
                    warn!(%actor, error = %send_err, "could not deliver failure notice");
                }
                return;
            },
        };

        // Persist before sending: replies only go out once the step they
        // confirm is durable.
        if let Some(next) = &transition.next {
            if let Err(e) = self.states.save(actor, next).await {
                error!(%actor, error = %e, "could not persist conversation state, dropping replies");
                return;
            }
        }
        for (to, message) in transition.replies {
            if let Err(e) = self.transport.send(to, message).await {
                warn!(%to, error = %e, "reply delivery failed");
            }
        }
    }
}

impl EventSink for AssistantSink {
    fn handle(&self, event: InboundEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.process(event))
    }
}

/// The assembled assistant: feed it inbound events, spawn its worker.
pub struct Assistant {
    router: ActorRouter,
}

impl Assistant {
    /// Wires the assistant together and recovers persisted notification
    /// timers.
    ///
    /// Returns the assistant and the scheduler worker; the caller spawns
    /// the worker (`tokio::spawn(worker.run())`) before delivering
    /// events.
    ///
    /// # Errors
    ///
    /// Fails when startup recovery cannot scan the persisted orders.
    pub async fn start(
        store: Arc<dyn DurableStore>,
        transport: Arc<dyn ChatTransport>,
        media: Option<Arc<dyn MediaStore>>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> anyhow::Result<(Self, SchedulerWorker<String>)> {
        let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), transport.clone()));
        let (scheduler, worker) = Scheduler::new(dispatcher, clock.clone());
        restore_scheduled_orders(store.as_ref(), &scheduler).await?;

        let env = Arc::new(AssistantEnv {
            store: store.clone(),
            clock,
            media,
            scheduler,
            config,
        });
        let sink = Arc::new(AssistantSink {
            env,
            states: StateStore::new(store),
            transport,
        });
        info!("assistant started");
        Ok((Self { router: ActorRouter::new(sink) }, worker))
    }

    /// Delivers one inbound event; processing is serialized per actor.
    pub async fn deliver(&self, event: InboundEvent) {
        self.router.deliver(event).await;
    }
}

/// Runs one event against the machine directly, persisting state and
/// sending replies exactly like the router path does. Used by tests that
/// need completion instead of fire-and-forget delivery.
///
/// # Errors
///
/// [`machine::FlowError`] when a flow hits an infrastructure failure.
pub async fn process_event(
    env: &AssistantEnv,
    states: &StateStore,
    transport: &dyn ChatTransport,
    event: InboundEvent,
) -> Result<ConversationState, machine::FlowError> {
    let actor = event.actor;
    let state = states.load(actor).await?;
    let transition = machine::handle_event(env, state.clone(), &event).await?;
    let next = transition.next.unwrap_or(state);
    states.save(actor, &next).await?;
    for (to, message) in transition.replies {
        if let Err(e) = transport.send(to, message).await {
            warn!(%to, error = %e, "reply delivery failed");
        }
    }
    Ok(next)
}
