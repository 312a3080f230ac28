use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Events emitted by the pricing engine after successful commits. Delivery
/// is best-effort: send failures are logged by the caller, never propagated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CouponCreated(Uuid),
    CouponUpdated(Uuid),
    CouponArchived(Uuid),
    CouponRedeemed {
        coupon_id: Uuid,
        order_id: Uuid,
        discount_amount: Decimal,
    },
    ShippingTierCreated(Uuid),
    ShippingTierUpdated(Uuid),
    ShippingTierActivated(Uuid),
    ShippingTierDeactivated(Uuid),
    GstRateChanged { old: Decimal, new: Decimal },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
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
}
