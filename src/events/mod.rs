use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Handle used by services to publish engine events.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. Failures are reported, not raised;
    /// event delivery is observability, never control flow.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order lifecycle
    OrderCreated {
        order_id: String,
        customer_email: String,
        total: Decimal,
    },
    OrderReplaced {
        old_order_id: String,
        customer_email: String,
    },
    OrderStatusChanged {
        order_id: String,
        old_status: String,
        new_status: String,
    },
    OrderPaid {
        order_id: String,
        invoice_num: i64,
    },
    PaymentErrorFlagged {
        order_id: String,
    },
    TrackingNumberSet {
        order_id: String,
        tracking_number: String,
    },
    ReminderSent {
        order_id: String,
        attempt: i32,
        discounted: bool,
    },

    // Stock
    StockDecremented {
        order_id: String,
        remaining: i64,
    },
    StockReplenished {
        future_stock_id: i32,
        amount: i32,
        total: i64,
    },
    SubscriptionNotified {
        customer_email: String,
        future_stock_id: i32,
    },

    // Affiliates
    AffiliateCredited {
        affiliate_id: i32,
        order_id: String,
        amount: Decimal,
    },
    AffiliatePaymentApplied {
        affiliate_id: i32,
        amount: Decimal,
    },
    AffiliatePaymentReverted {
        affiliate_id: i32,
        amount: Decimal,
    },
}

/// Background consumer: drains the channel and logs each event with
/// structured fields. Runs until every sender is dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::OrderPaid {
                order_id,
                invoice_num,
            } => {
                info!(%order_id, invoice_num, "order paid");
            }
            Event::StockDecremented {
                order_id,
                remaining,
            } => {
                info!(%order_id, remaining, "stock decremented");
            }
            other => debug!(event = ?other, "event processed"),
        }
    }
    info!("Event processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn events_flow_through_the_channel() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        sender
            .send(Event::OrderCreated {
                order_id: "a1b2c3d4e5f6".into(),
                customer_email: "a@b.c".into(),
                total: dec!(300.60),
            })
            .await
            .unwrap();

        match rx.recv().await {
            Some(Event::OrderCreated { order_id, .. }) => assert_eq!(order_id, "a1b2c3d4e5f6"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        let result = sender
            .send(Event::PaymentErrorFlagged {
                order_id: "a1b2c3d4e5f6".into(),
            })
            .await;
        assert!(result.is_err());
    }
}
