//! Event catalogue of the live socket. Inside the crate every frame is a JSON
//! envelope of the form `{"event": "<name>", "data": {...}}`; the transport
//! maps it to its own framing.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::offer::Offer;
use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    Timeout,
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Outbound {
    #[serde(rename = "nurse:register", rename_all = "camelCase")]
    Register { nurse_id: String, token: String },

    #[serde(rename = "order:watch", rename_all = "camelCase")]
    Watch { order_id: String },

    #[serde(rename = "order:accept", rename_all = "camelCase")]
    Accept { order_id: String },

    #[serde(rename = "order:decline", rename_all = "camelCase")]
    Decline { order_id: String },

    #[serde(rename = "order:expired", rename_all = "camelCase")]
    Expired {
        order_id: String,
        reason: ExpiryReason,
    },

    #[serde(rename = "order:status", rename_all = "camelCase")]
    Status {
        order_id: String,
        status: OrderStatus,
    },

    #[serde(rename = "nurse:location", rename_all = "camelCase")]
    Location {
        order_id: String,
        lat: f64,
        lng: f64,
        speed: Option<f64>,
    },
}

impl Outbound {
    pub fn name(&self) -> &'static str {
        match self {
            Outbound::Register { .. } => "nurse:register",
            Outbound::Watch { .. } => "order:watch",
            Outbound::Accept { .. } => "order:accept",
            Outbound::Decline { .. } => "order:decline",
            Outbound::Expired { .. } => "order:expired",
            Outbound::Status { .. } => "order:status",
            Outbound::Location { .. } => "nurse:location",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `order:new`
    OrderNew(Offer),
    /// `order:taken`. The payload is optional and only its id is kept.
    OrderTaken { order_id: Option<String> },
    /// `order:updated`
    OrderUpdated { status: OrderStatus },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct StatusUpdate {
    status: OrderStatus,
}

impl Inbound {
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        let Envelope { event, data } = serde_json::from_str(frame)?;
        match event.as_str() {
            "order:new" => Offer::from_value(data).map(Inbound::OrderNew),
            "order:taken" => Ok(Inbound::OrderTaken {
                order_id: taken_order_id(&data),
            }),
            "order:updated" => {
                let StatusUpdate { status } = serde_json::from_value(data)?;
                Ok(Inbound::OrderUpdated { status })
            }
            other => Err(serde_json::Error::custom(format!("unknown event `{other}`"))),
        }
    }
}

fn taken_order_id(data: &Value) -> Option<String> {
    match data.get("orderId")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{ExpiryReason, Inbound, Outbound};
    use crate::models::order::OrderStatus;

    fn encoded(event: &Outbound) -> Value {
        serde_json::from_str(&event.encode().unwrap()).unwrap()
    }

    #[test]
    fn outbound_frames_use_camel_case_payloads() {
        let register = Outbound::Register {
            nurse_id: "N1".to_string(),
            token: "tok".to_string(),
        };
        assert_eq!(
            encoded(&register),
            json!({ "event": "nurse:register", "data": { "nurseId": "N1", "token": "tok" } })
        );

        let location = Outbound::Location {
            order_id: "O1".to_string(),
            lat: 41.3,
            lng: 69.2,
            speed: None,
        };
        assert_eq!(
            encoded(&location),
            json!({
                "event": "nurse:location",
                "data": { "orderId": "O1", "lat": 41.3, "lng": 69.2, "speed": null }
            })
        );

        let expired = Outbound::Expired {
            order_id: "O1".to_string(),
            reason: ExpiryReason::Timeout,
        };
        assert_eq!(encoded(&expired)["data"]["reason"], "timeout");
        assert_eq!(expired.name(), "order:expired");
    }

    #[test]
    fn inbound_frames_decode() {
        let new = Inbound::decode(r#"{"event":"order:new","data":{"orderId":"O1","eta":12,"distance":3.4}}"#)
            .unwrap();
        match new {
            Inbound::OrderNew(offer) => {
                assert_eq!(offer.order_id, "O1");
                assert_eq!(offer.eta, 12);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            Inbound::decode(r#"{"event":"order:taken"}"#).unwrap(),
            Inbound::OrderTaken { order_id: None }
        );
        assert_eq!(
            Inbound::decode(r#"{"event":"order:updated","data":{"status":"on_way"}}"#).unwrap(),
            Inbound::OrderUpdated {
                status: OrderStatus::OnWay
            }
        );
    }

    #[test]
    fn order_taken_accepts_any_payload() {
        assert_eq!(
            Inbound::decode(r#"{"event":"order:taken","data":{"orderId":"O1"}}"#).unwrap(),
            Inbound::OrderTaken {
                order_id: Some("O1".to_string())
            }
        );
        assert_eq!(
            Inbound::decode(r#"{"event":"order:taken","data":{"orderId":7,"by":"N2"}}"#).unwrap(),
            Inbound::OrderTaken {
                order_id: Some("7".to_string())
            }
        );
        assert_eq!(
            Inbound::decode(r#"{"event":"order:taken","data":null}"#).unwrap(),
            Inbound::OrderTaken { order_id: None }
        );
        assert_eq!(
            Inbound::decode(r#"{"event":"order:taken","data":"O1"}"#).unwrap(),
            Inbound::OrderTaken { order_id: None }
        );
    }

    #[test]
    fn order_new_with_numeric_id_and_null_details_decodes() {
        let frame = r#"{"event":"order:new","data":{"orderId":42,"service":null,"client":null,"eta":7.6}}"#;
        match Inbound::decode(frame).unwrap() {
            Inbound::OrderNew(offer) => {
                assert_eq!(offer.order_id, "42");
                assert_eq!(offer.eta, 8);
                assert_eq!(offer.service.name, "");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_events_are_rejected() {
        assert!(Inbound::decode(r#"{"event":"chat:message","data":{}}"#).is_err());
    }
}
