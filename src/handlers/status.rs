use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

use crate::core::relay::SharedRelayEngine;

/// Body of the status endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusReport {
    pub connections: usize,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
}

pub async fn handle_status(
    relay: SharedRelayEngine,
    started_at: DateTime<Utc>,
) -> Result<impl warp::Reply, Infallible> {
    let report = StatusReport {
        connections: relay.registry().len().await,
        started_at,
        uptime_secs: (Utc::now() - started_at).num_seconds(),
    };
    Ok(warp::reply::json(&report))
}
