use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Executions currently inside the pipeline. Admission control lives above
/// the pipeline; this only tells it how busy the host is.
#[derive(Clone, Debug, Default)]
pub struct InFlight {
    entries: Arc<DashMap<Uuid, DateTime<Utc>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one execution until the returned ticket is dropped.
    pub fn enter(&self) -> InFlightTicket {
        let id = Uuid::new_v4();
        self.entries.insert(id, Utc::now());
        InFlightTicket {
            id,
            entries: self.entries.clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|entry| *entry.value()).min()
    }
}

#[derive(Debug)]
pub struct InFlightTicket {
    id: Uuid,
    entries: Arc<DashMap<Uuid, DateTime<Utc>>>,
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.entries.remove(&self.id);
    }
}
