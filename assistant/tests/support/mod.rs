//! Shared harness for the assistant integration tests: an in-memory
//! world with a recording transport and a fixed clock.

#![allow(dead_code)] // not every test file uses every helper
#![allow(clippy::unwrap_used)] // Test code can unwrap

use mealflow_assistant::config::Config;
use mealflow_assistant::machine::state::ConversationState;
use mealflow_assistant::machine::AssistantEnv;
use mealflow_assistant::notify::NotificationDispatcher;
use mealflow_assistant::service::process_event;
use mealflow_assistant::state_store::StateStore;
use mealflow_core::chat::{ButtonAction, EventKind, InboundEvent, OutboundMessage};
use mealflow_core::environment::Clock;
use mealflow_core::store::DurableStore;
use mealflow_core::{ActorId, GeoPoint};
use mealflow_runtime::{Scheduler, SchedulerWorker};
use mealflow_testing::{test_clock, InMemoryStore, RecordingTransport};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct World {
    pub store: Arc<InMemoryStore>,
    pub transport: Arc<RecordingTransport>,
    pub clock: Arc<dyn Clock>,
    pub env: AssistantEnv,
    pub states: StateStore,
    pub worker: Option<SchedulerWorker<String>>,
}

impl World {
    pub fn new(admins: Vec<i64>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let transport = Arc::new(RecordingTransport::new());
        let config = Config {
            admins: admins.into_iter().map(ActorId).collect(),
            ..Config::default()
        };
        Self::assemble(store, transport, clock, config)
    }

    /// A fresh process over the same store: new scheduler, new state
    /// store, same durable data.
    pub fn restart(&self) -> Self {
        Self::assemble(
            self.store.clone(),
            self.transport.clone(),
            self.clock.clone(),
            self.env.config.clone(),
        )
    }

    fn assemble(
        store: Arc<InMemoryStore>,
        transport: Arc<RecordingTransport>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), transport.clone()));
        let (scheduler, worker) = Scheduler::new(dispatcher, clock.clone());
        let env = AssistantEnv {
            store: store.clone(),
            clock: clock.clone(),
            media: None,
            scheduler,
            config,
        };
        let states = StateStore::new(store.clone());
        Self { store, transport, clock, env, states, worker: Some(worker) }
    }

    pub async fn event(&self, event: InboundEvent) -> ConversationState {
        process_event(&self.env, &self.states, self.transport.as_ref(), event)
            .await
            .unwrap()
    }

    pub async fn say(&self, actor: ActorId, text: &str) -> ConversationState {
        self.event(InboundEvent::text(actor, text)).await
    }

    pub async fn press(&self, actor: ActorId, action: ButtonAction) -> ConversationState {
        self.event(InboundEvent::button(actor, action)).await
    }

    pub async fn share_location(&self, actor: ActorId, lat: f64, lon: f64) -> ConversationState {
        self.event(InboundEvent { actor, kind: EventKind::Location(GeoPoint::new(lat, lon)) })
            .await
    }

    pub async fn register(&self, actor: ActorId, name: &str, phone: &str) {
        self.event(InboundEvent {
            actor,
            kind: EventKind::Contact { phone: phone.to_string(), display_name: name.to_string() },
        })
        .await;
    }

    pub fn last_text(&self, actor: ActorId) -> String {
        self.transport.last_to(actor).map(|m| m.text).unwrap_or_default()
    }

    pub fn last_message(&self, actor: ActorId) -> OutboundMessage {
        self.transport.last_to(actor).unwrap()
    }

    pub async fn seed_vendor(
        &self,
        vendor_id: &str,
        name: &str,
        manager: i64,
        location: Option<(f64, f64)>,
        foods: &[(&str, &str)],
    ) {
        let foods: Vec<Value> = foods
            .iter()
            .map(|(food, price)| json!({"name": food, "price": price}))
            .collect();
        let mut record = json!({
            "name": name,
            "manager_id": manager,
            "foods": foods,
            "rating": 0.0,
            "orders_count": 0,
        });
        if let Some((lat, lon)) = location {
            record["location"] = json!({"lat": lat, "lon": lon});
        }
        self.store
            .set(mealflow_assistant::paths::vendor(vendor_id), record)
            .await
            .unwrap();
    }

    /// The ids of every persisted order.
    pub async fn order_ids(&self) -> Vec<String> {
        match self.store.get(mealflow_assistant::paths::orders()).await.unwrap() {
            Some(Value::Object(children)) => children.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}
