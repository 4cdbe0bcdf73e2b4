use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{MovementDirection, OrderStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs instead of failing. Events are published after
    /// commit, so a closed channel must not fail the operation that produced them.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Dropping domain event");
            counter!("bakery_events.dropped", 1, "event" => name);
        }
    }
}

/// Domain events published after a successful commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        user_id: Uuid,
        total: Decimal,
        line_count: usize,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    ProductPriceChanged {
        product_id: Uuid,
        old_price: Decimal,
        new_price: Decimal,
    },
    ProductDeactivated(Uuid),
    MovementRecorded {
        movement_id: Uuid,
        supply_item_id: Uuid,
        direction: MovementDirection,
        quantity: Decimal,
        resulting_quantity: Decimal,
    },
    LowStockDetected {
        supply_item_id: Uuid,
        current_quantity: Decimal,
        minimum_quantity: Decimal,
    },
    CartCleared {
        owner: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderPlaced { .. } => "order_placed",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::ProductPriceChanged { .. } => "product_price_changed",
            Event::ProductDeactivated(_) => "product_deactivated",
            Event::MovementRecorded { .. } => "movement_recorded",
            Event::LowStockDetected { .. } => "low_stock_detected",
            Event::CartCleared { .. } => "cart_cleared",
        }
    }
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("bakery_events.processed", 1, "event" => event.name());

        match &event {
            Event::OrderPlaced {
                order_id,
                user_id,
                total,
                line_count,
            } => {
                info!(%order_id, %user_id, %total, line_count, "Order placed");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Order status changed");
            }
            Event::LowStockDetected {
                supply_item_id,
                current_quantity,
                minimum_quantity,
            } => {
                warn!(
                    %supply_item_id,
                    %current_quantity,
                    %minimum_quantity,
                    "Supply item at or below minimum quantity"
                );
            }
            _ => {
                info!(event = event.name(), "Event: {:?}", event);
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender.send_or_log(Event::ProductDeactivated(Uuid::nil())).await;
        assert!(sender.send(Event::ProductDeactivated(Uuid::nil())).await.is_err());
    }

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        sender.send_or_log(Event::ProductDeactivated(first)).await;
        sender.send_or_log(Event::ProductDeactivated(second)).await;

        assert_eq!(rx.recv().await, Some(Event::ProductDeactivated(first)));
        assert_eq!(rx.recv().await, Some(Event::ProductDeactivated(second)));
    }
}
