use std::fmt;
use std::time::Duration;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "number")]
    pub price: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub icon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default, deserialize_with = "lenient")]
    pub address: String,
}

/// Snapshot of an order proposed by dispatch. Only `orderId` is mandatory;
/// everything else degrades to empty values when the backend omits it,
/// sends `null` or sends the wrong shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    #[serde(deserialize_with = "order_id")]
    pub order_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub service: ServiceInfo,
    #[serde(default, deserialize_with = "lenient")]
    pub client: ClientInfo,
    #[serde(default, deserialize_with = "number")]
    pub distance: f64,
    #[serde(default, deserialize_with = "minutes")]
    pub eta: u32,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub bonus: Option<bool>,
}

/// Ids arrive as strings from the socket and as numbers from some push
/// payloads. Both name the same order.
fn order_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) if !id.is_empty() => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(D::Error::custom(format!(
            "orderId must be a non-empty string or a number, got {other}"
        ))),
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|n| n.is_finite()).unwrap_or_default())
}

fn minutes<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let eta = number(deserializer)?;
    Ok(eta.round().clamp(0.0, u32::MAX as f64) as u32)
}

impl Offer {
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferSource {
    /// `order:new` on the live socket.
    Live,
    /// Read from the durable handoff store on load or focus.
    Handoff,
    /// Posted by the background worker to an open window.
    WorkerMessage,
}

impl OfferSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferSource::Live => "live",
            OfferSource::Handoff => "handoff",
            OfferSource::WorkerMessage => "worker_message",
        }
    }

    /// Offers that travelled through a notification get the long window.
    pub fn countdown(&self, live: Duration, handoff: Duration) -> u32 {
        let window = match self {
            OfferSource::Live => live,
            OfferSource::Handoff | OfferSource::WorkerMessage => handoff,
        };
        window.as_secs() as u32
    }
}

impl fmt::Display for OfferSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{Offer, OfferSource};

    #[test]
    fn parses_backend_payload() {
        let offer = Offer::from_value(json!({
            "orderId": "O1",
            "service": { "name": "IV drip", "price": 150000, "icon": "💉" },
            "client": { "address": "Chilonzor 7" },
            "distance": 3.4,
            "eta": 12,
            "bonus": true
        }))
        .unwrap();

        assert_eq!(offer.order_id, "O1");
        assert_eq!(offer.service.price, 150000.0);
        assert_eq!(offer.client.address, "Chilonzor 7");
        assert_eq!(offer.eta, 12);
        assert_eq!(offer.bonus, Some(true));
    }

    #[test]
    fn missing_details_default_but_order_id_is_required() {
        let offer = Offer::from_value(json!({ "orderId": "O2" })).unwrap();
        assert_eq!(offer.service.name, "");
        assert_eq!(offer.distance, 0.0);

        assert!(Offer::from_value(json!({ "eta": 4 })).is_err());
        assert!(Offer::from_value(json!({ "orderId": "" })).is_err());
        assert!(Offer::from_value(json!({ "orderId": null })).is_err());
    }

    #[test]
    fn numeric_id_and_null_details_still_make_an_offer() {
        let offer = Offer::from_value(json!({
            "orderId": 42,
            "service": null,
            "client": null,
            "distance": null,
            "eta": 12.5,
            "bonus": null
        }))
        .unwrap();

        assert_eq!(offer.order_id, "42");
        assert_eq!(offer.service, Default::default());
        assert_eq!(offer.client.address, "");
        assert_eq!(offer.distance, 0.0);
        assert_eq!(offer.eta, 13);
        assert_eq!(offer.bonus, None);
    }

    #[test]
    fn string_numbers_and_odd_shapes_are_tolerated() {
        let offer = Offer::from_value(json!({
            "orderId": "O3",
            "service": { "name": null, "price": "150000", "icon": 7 },
            "client": "Chilonzor 7",
            "distance": "3.4",
            "eta": "-2"
        }))
        .unwrap();

        assert_eq!(offer.service.price, 150000.0);
        assert_eq!(offer.service.name, "");
        assert_eq!(offer.service.icon, "");
        assert_eq!(offer.client.address, "");
        assert_eq!(offer.distance, 3.4);
        assert_eq!(offer.eta, 0);
    }

    #[test]
    fn notification_paths_get_the_long_countdown() {
        let live = Duration::from_secs(30);
        let handoff = Duration::from_secs(90);

        assert_eq!(OfferSource::Live.countdown(live, handoff), 30);
        assert_eq!(OfferSource::Handoff.countdown(live, handoff), 90);
        assert_eq!(OfferSource::WorkerMessage.countdown(live, handoff), 90);
    }
}
