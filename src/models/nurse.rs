use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Profile returned by `GET /nurses/me`. Unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NurseProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub experience: Option<u32>,
    #[serde(default)]
    pub is_available: bool,
}

/// Local cache of the server-side duty flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyState {
    pub on_duty: bool,
    pub last_position: Option<GeoPoint>,
}
