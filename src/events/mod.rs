use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entities::{
    alert::{AlertKind, AlertSeverity},
    stock_movement::MovementKind,
};

/// Publishing side of the notification channel.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, waiting for channel capacity.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Best-effort publish that never waits for capacity. A full or closed
    /// channel drops the event; the drop is logged and counted.
    pub async fn publish(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.sender.try_send(event) {
            metrics::counter!("obra.events.dropped", 1);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "channel full",
                mpsc::error::TrySendError::Closed(_) => "channel closed",
            };
            warn!(event = name, reason, "event dropped");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum Event {
    StockMovementRecorded {
        movement_id: Uuid,
        material_id: Uuid,
        kind: MovementKind,
        quantity: Decimal,
        stock_after: Decimal,
        project_id: Option<Uuid>,
    },
    AllocationsReconciled {
        project_id: Uuid,
        returned: usize,
        reserved: usize,
        updated: usize,
    },
    MaterialConsumed {
        project_id: Uuid,
        material_id: Uuid,
        quantity: Decimal,
        quantity_consumed: Decimal,
    },
    BudgetSaved {
        project_id: Uuid,
        total: Decimal,
        corrected: bool,
    },
    AlertOpened {
        alert_id: Uuid,
        kind: AlertKind,
        severity: AlertSeverity,
        project_id: Option<Uuid>,
        material_id: Option<Uuid>,
        recipients: Vec<Uuid>,
        message: String,
    },
    AlertResolved {
        alert_id: Uuid,
    },
    ProjectAlertsResolved {
        project_id: Uuid,
        count: u64,
    },
    ProgressRecomputed {
        project_id: Uuid,
        previous: i32,
        current: i32,
    },
    ProjectDeactivated(Uuid),
}

impl Event {
    /// Dotted name used by external subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            Event::StockMovementRecorded { .. } => "stock_movement.recorded",
            Event::AllocationsReconciled { .. } => "allocations.reconciled",
            Event::MaterialConsumed { .. } => "material.consumed",
            Event::BudgetSaved { .. } => "budget.saved",
            Event::AlertOpened { .. } => "alert.opened",
            Event::AlertResolved { .. } => "alert.resolved",
            Event::ProjectAlertsResolved { .. } => "project.alerts_resolved",
            Event::ProgressRecomputed { .. } => "project.progress_recomputed",
            Event::ProjectDeactivated(_) => "project.deactivated",
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Delivers alert notifications to the log until a push or mail transport is wired in.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl EventHandler for LogNotifier {
    async fn handle_event(&self, event: &Event) -> Result<(), String> {
        if let Event::AlertOpened {
            alert_id,
            kind,
            severity,
            recipients,
            message,
            ..
        } = event
        {
            for recipient in recipients {
                info!(
                    %alert_id,
                    %recipient,
                    kind = kind.as_str(),
                    ?severity,
                    message = %message,
                    "notifying recipient"
                );
            }
        }
        Ok(())
    }
}

/// Drains the channel and dispatches each event to every handler until all senders drop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        debug!(event = event.name(), payload = ?event, "received event");
        for handler in &handlers {
            if let Err(e) = handler.handle_event(&event).await {
                error!(event = event.name(), error = %e, "event handler failed");
            }
        }
    }

    info!("Event channel closed, stopping event processing");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<&'static str>>);

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle_event(&self, event: &Event) -> Result<(), String> {
            self.0.lock().unwrap().push(event.name());
            Err("recorded".into())
        }
    }

    #[tokio::test]
    async fn publish_to_closed_channel_is_swallowed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        EventSender::new(tx)
            .publish(Event::ProjectDeactivated(Uuid::new_v4()))
            .await;
    }

    #[tokio::test]
    async fn publish_does_not_wait_on_a_full_channel() {
        let (tx, mut rx) = mpsc::channel(1);
        let sender = EventSender::new(tx);
        let first = Uuid::new_v4();
        sender.publish(Event::ProjectDeactivated(first)).await;
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            sender.publish(Event::ProjectDeactivated(Uuid::new_v4())),
        )
        .await
        .expect("publish must not block");

        assert_eq!(rx.recv().await, Some(Event::ProjectDeactivated(first)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn handler_errors_do_not_stop_processing() {
        let (tx, rx) = mpsc::channel(4);
        let recorder = Arc::new(Recorder::default());
        let sender = EventSender::new(tx);
        sender
            .send(Event::AlertResolved { alert_id: Uuid::new_v4() })
            .await
            .unwrap();
        sender
            .send(Event::ProjectDeactivated(Uuid::new_v4()))
            .await
            .unwrap();
        drop(sender);

        process_events(rx, vec![recorder.clone() as Arc<dyn EventHandler>]).await;
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["alert.resolved", "project.deactivated"]
        );
    }
}
