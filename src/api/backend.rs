//! Client for the dispatch backend's REST API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::nurse::NurseProfile;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of registering for push deliveries. Shown, never acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum PushStatus {
    Pending,
    Subscribed,
    Failed(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKey {
    public_key: String,
}

#[derive(Clone)]
pub struct BackendApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl BackendApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to create http client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn fetch_profile(&self) -> Result<NurseProfile, AppError> {
        let profile = self
            .client
            .get(self.url("/nurses/me"))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json::<NurseProfile>()
            .await?;

        debug!(nurse_id = %profile.id, "profile fetched");
        Ok(profile)
    }

    /// Reports availability. Going on duty carries the last known position.
    pub async fn set_duty(&self, position: Option<GeoPoint>) -> Result<(), AppError> {
        let body = match position {
            Some(point) => json!({ "available": true, "lat": point.lat, "lng": point.lng }),
            None => json!({ "available": false }),
        };

        self.client
            .put(self.url("/nurses/duty"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn push_public_key(&self) -> Result<String, AppError> {
        let key = self
            .client
            .get(self.url("/push/public-key"))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json::<PublicKey>()
            .await?;
        Ok(key.public_key)
    }

    pub async fn subscribe_push(&self, endpoint: &str, public_key: &str) -> Result<(), AppError> {
        let body = json!({
            "endpoint": endpoint,
            "keys": { "applicationServerKey": public_key },
        });

        self.client
            .post(self.url("/push/subscribe"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetches the server key and registers `endpoint`. Never fails: the
    /// outcome is folded into a status for display.
    pub async fn register_push(&self, endpoint: &str) -> PushStatus {
        let result = match self.push_public_key().await {
            Ok(key) => self.subscribe_push(endpoint, &key).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                debug!(endpoint = %endpoint, "push subscription registered");
                PushStatus::Subscribed
            }
            Err(err) => {
                warn!(error = %err, "push subscription failed");
                PushStatus::Failed(err.to_string())
            }
        }
    }

    pub async fn request_test_push(&self) -> Result<(), AppError> {
        self.client
            .post(self.url("/push/test"))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::{BackendApi, PushStatus};
    use crate::error::AppError;
    use crate::geo::GeoPoint;

    type Seen = Arc<Mutex<Vec<(String, Value)>>>;

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            == Some("Bearer tok")
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn backend(seen: Seen, push_ok: bool) -> Router {
        Router::new()
            .route(
                "/api/nurses/me",
                get(|headers: HeaderMap| async move {
                    if !authorized(&headers) {
                        return Err(StatusCode::UNAUTHORIZED);
                    }
                    Ok(Json(json!({
                        "id": "N1",
                        "name": "Dilnoza",
                        "rating": 4.9,
                        "isAvailable": true,
                        "phone": "ignored"
                    })))
                }),
            )
            .route(
                "/api/nurses/duty",
                put(|State(seen): State<Seen>, Json(body): Json<Value>| async move {
                    seen.lock().unwrap().push(("duty".to_string(), body));
                    StatusCode::OK
                }),
            )
            .route(
                "/api/push/public-key",
                get(move || async move {
                    if push_ok {
                        Ok(Json(json!({ "publicKey": "BPk" })))
                    } else {
                        Err(StatusCode::SERVICE_UNAVAILABLE)
                    }
                }),
            )
            .route(
                "/api/push/subscribe",
                post(|State(seen): State<Seen>, Json(body): Json<Value>| async move {
                    seen.lock().unwrap().push(("subscribe".to_string(), body));
                    StatusCode::CREATED
                }),
            )
            .with_state(seen)
    }

    #[tokio::test]
    async fn profile_and_duty_round_trip() {
        let seen = Seen::default();
        let base = serve(backend(seen.clone(), true)).await;
        let api = BackendApi::new(base, "tok").unwrap();

        let profile = api.fetch_profile().await.unwrap();
        assert_eq!(profile.id, "N1");
        assert!(profile.is_available);

        api.set_duty(Some(GeoPoint { lat: 41.3, lng: 69.2 })).await.unwrap();
        api.set_duty(None).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1, json!({ "available": true, "lat": 41.3, "lng": 69.2 }));
        assert_eq!(seen[1].1, json!({ "available": false }));
    }

    #[tokio::test]
    async fn rejected_token_is_unauthorized() {
        let base = serve(backend(Seen::default(), true)).await;
        let api = BackendApi::new(base, "wrong").unwrap();

        assert!(matches!(api.fetch_profile().await, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn push_registration_sends_the_descriptor() {
        let seen = Seen::default();
        let base = serve(backend(seen.clone(), true)).await;
        let api = BackendApi::new(base, "tok").unwrap();

        let status = api.register_push("http://localhost:4000/push").await;

        assert_eq!(status, PushStatus::Subscribed);
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0],
            (
                "subscribe".to_string(),
                json!({
                    "endpoint": "http://localhost:4000/push",
                    "keys": { "applicationServerKey": "BPk" }
                })
            )
        );
    }

    #[tokio::test]
    async fn push_registration_failure_is_passive() {
        let base = serve(backend(Seen::default(), false)).await;
        let api = BackendApi::new(base, "tok").unwrap();

        assert!(matches!(
            api.register_push("http://localhost:4000/push").await,
            PushStatus::Failed(_)
        ));
    }
}
