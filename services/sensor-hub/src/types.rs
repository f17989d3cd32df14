use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct DeviceAuthReq {
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeviceAuthResp {
    pub access_token: String,
}

// Response body for POST /data
#[derive(Debug, Serialize)]
pub struct IngestResp {
    pub status: &'static str,
}

// One element of the GET /data array; timestamp already converted to the
// display offset.
#[derive(Debug, Serialize)]
pub struct ReadingOut {
    pub timestamp: String,
    pub temperature: f64,
    pub humidity: f64,
}

#[derive(Debug, Serialize)]
pub struct ThresholdResp {
    pub threshold: f64,
}

// Query string for GET /predict; both fields are validated by hand so a
// bad value becomes our 400 shape rather than an extractor rejection.
#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    pub hours: Option<String>,
    pub strategy: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictResp {
    pub prediction: f64,
    pub data_points: usize,
    pub strategy: &'static str,
    pub future_time: String,
}
