use serde::{Deserialize, Serialize};

use crate::models::offer::{Offer, OfferSource};
use crate::models::order::{ActiveOrder, OrderStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingView {
    pub offer: Offer,
    pub countdown: u32,
    pub source: OfferSource,
}

/// Everything a window shows. Published on every state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub pending: Option<PendingView>,
    pub active_order: Option<ActiveOrder>,
    pub order_status: OrderStatus,
    pub completed_today: u32,
    pub connected: bool,
    pub alert_playing: bool,
}

impl SessionView {
    pub fn active_order_id(&self) -> Option<String> {
        self.active_order.as_ref().map(|order| order.order_id.clone())
    }
}
