use tokio::sync::mpsc;

use crate::guard::{AccessCode, GatewayLimits};
use crate::models::UpstreamJob;
use crate::rate_limit::AdmissionController;

// app's shared state

pub struct AppState {
    pub admission: AdmissionController,
    pub access_code: AccessCode,
    pub limits: GatewayLimits,
    // None when no API key is configured
    pub upstream_tx: Option<mpsc::Sender<UpstreamJob>>,
}
