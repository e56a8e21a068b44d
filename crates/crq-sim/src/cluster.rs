//! A complete in-memory cluster wired together.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crq_protocol::Backends;

use crate::artifacts::MemoryArtifactStore;
use crate::clock::ManualClock;
use crate::credentials::StaticCredentials;
use crate::request_store::MemoryRequestStore;
use crate::units::SimUnits;

/// Every simulated collaborator, sharing state with the `Backends` handed
/// out by [`SimCluster::backends`].
#[derive(Debug, Clone)]
pub struct SimCluster {
    pub cluster_id: String,
    pub requests: MemoryRequestStore,
    pub units: SimUnits,
    pub artifacts: MemoryArtifactStore,
    pub credentials: StaticCredentials,
    pub clock: ManualClock,
}

impl SimCluster {
    /// Default start time of the simulated clock.
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn new(cluster_id: &str) -> Self {
        let requests = MemoryRequestStore::new();
        Self {
            cluster_id: cluster_id.to_string(),
            units: SimUnits::new(cluster_id, requests.clone()),
            requests,
            artifacts: MemoryArtifactStore::new(cluster_id),
            credentials: StaticCredentials::new(),
            clock: ManualClock::new(Self::epoch()),
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            requests: Arc::new(self.requests.clone()),
            units: Arc::new(self.units.clone()),
            artifacts: Arc::new(self.artifacts.clone()),
            credentials: Arc::new(self.credentials.clone()),
            clock: Arc::new(self.clock.clone()),
        }
    }
}
