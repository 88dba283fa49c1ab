use serde::{Deserialize, Serialize};

use crate::models::offer::Offer;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Accepted,
    OnWay,
    Arrived,
    Working,
    Completed,
}

impl OrderStatus {
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Accepted => Some(OrderStatus::OnWay),
            OrderStatus::OnWay => Some(OrderStatus::Arrived),
            OrderStatus::Arrived => Some(OrderStatus::Working),
            OrderStatus::Working => Some(OrderStatus::Completed),
            OrderStatus::Completed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Accepted => "accepted",
            OrderStatus::OnWay => "on_way",
            OrderStatus::Arrived => "arrived",
            OrderStatus::Working => "working",
            OrderStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveOrder {
    pub order_id: String,
    pub offer: Offer,
}

impl From<Offer> for ActiveOrder {
    fn from(offer: Offer) -> Self {
        Self {
            order_id: offer.order_id.clone(),
            offer,
        }
    }
}
