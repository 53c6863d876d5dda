//! Deferred vendor notifications.
//!
//! When an order's ready-by time arrives, the vendor's manager gets a
//! summary with a "mark as served" button. Dispatch re-reads the order at
//! fire time and does nothing when the order is gone or already served,
//! which makes re-delivery after a restart harmless: recovery re-arms a
//! timer for every order still in `scheduled` status.
//!
//! Everything here is fire-and-forget from the scheduler's point of view:
//! failures are logged, never propagated into the timer worker.

use crate::types::{money, Order, OrderStatus};
use crate::{ids, paths, queries};
use mealflow_core::chat::{ButtonAction, ChatTransport, Keyboard, OutboundMessage};
use mealflow_core::store::{DurableStore, StoreError};
use mealflow_runtime::retry::RetryPolicy;
use mealflow_runtime::{JobHandler, Scheduler};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sends the order-due notification to the vendor's manager.
pub struct NotificationDispatcher {
    store: Arc<dyn DurableStore>,
    transport: Arc<dyn ChatTransport>,
    retry: RetryPolicy,
}

impl NotificationDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(store: Arc<dyn DurableStore>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { store, transport, retry: RetryPolicy::default() }
    }

    /// Notifies the vendor about `order_id`, skipping silently when the
    /// order is gone or already served. Never fails; problems are logged.
    pub async fn dispatch(&self, order_id: &str) {
        let order = match queries::load_order(self.store.as_ref(), order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                debug!(order_id, "order gone before notification, skipping");
                return;
            },
            Err(e) => {
                warn!(order_id, error = %e, "could not load order for notification");
                return;
            },
        };
        if order.status == OrderStatus::Served {
            debug!(order_id, "order already served, skipping notification");
            return;
        }

        let manager = match queries::load_vendor(self.store.as_ref(), &order.vendor_id).await {
            Ok(Some(vendor)) => vendor.manager_id,
            Ok(None) => None,
            Err(e) => {
                warn!(order_id, error = %e, "could not load vendor for notification");
                return;
            },
        };
        let Some(manager) = manager else {
            warn!(order_id, vendor_id = %order.vendor_id, "no manager to notify");
            return;
        };

        let message = notification(order_id, &order);
        let delivery = self
            .retry
            .run(|| self.transport.send(manager, message.clone()))
            .await;
        if let Err(e) = delivery {
            warn!(order_id, error = %e, "failed to deliver order notification");
        } else {
            info!(order_id, %manager, "order notification delivered");
        }
    }
}

impl JobHandler<String> for NotificationDispatcher {
    fn run(&self, _job_id: String, order_id: String) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move { self.dispatch(&order_id).await })
    }
}

fn notification(order_id: &str, order: &Order) -> OutboundMessage {
    let mut lines = vec![format!("Order {order_id} is due for {}:", order.vendor_name)];
    for item in &order.items {
        lines.push(format!("- {} x{} ({})", item.name, item.quantity, money(item.subtotal)));
    }
    lines.push(format!("Total: {}", money(order.total)));
    lines.push(format!("For: {} ({})", order.user_name, order.phone));
    lines.push(format!("Ready by: {}", order.scheduled_for.format("%Y-%m-%d %H:%M UTC")));
    OutboundMessage::with_keyboard(
        lines.join("\n"),
        Keyboard::column(vec![(
            "Mark as served".to_string(),
            ButtonAction::MarkServed { order_id: order_id.to_string() },
        )]),
    )
}

/// Re-arms a notification timer for every order still in `scheduled`
/// status. Run once at startup, before accepting events; orders whose
/// deadline passed while the process was down fire immediately.
///
/// Returns how many timers were re-armed.
///
/// # Errors
///
/// [`StoreError`] when the order scan fails.
pub async fn restore_scheduled_orders(
    store: &dyn DurableStore,
    scheduler: &Scheduler<String>,
) -> Result<usize, StoreError> {
    let Some(Value::Object(children)) = store.get(paths::orders()).await? else {
        return Ok(0);
    };
    let mut restored = 0;
    for (order_id, value) in children {
        let order: Order = match serde_json::from_value(value) {
            Ok(order) => order,
            Err(e) => {
                warn!(order_id, error = %e, "skipping undecodable order during recovery");
                continue;
            },
        };
        if order.status == OrderStatus::Scheduled {
            scheduler.schedule(ids::order_job_id(&order_id), order.scheduled_for, order_id.clone());
            restored += 1;
        }
    }
    info!(restored, "re-armed scheduled order notifications");
    Ok(restored)
}
