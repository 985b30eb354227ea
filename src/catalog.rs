//! Event catalog seam
//!
//! Catalog CRUD, search and caching live in an external service; the
//! core only needs display metadata when enriching `BookingConfirmed`
//! for downstream notification templating. This trait is that interface,
//! with a static in-memory implementation for tests and single-node
//! deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::core_types::EventId;

/// Display metadata for one ticketed event
#[derive(Debug, Clone)]
pub struct EventInfo {
    pub name: String,
    pub date: Option<DateTime<Utc>>,
}

/// Read-only catalog lookup
#[async_trait]
pub trait EventCatalog: Send + Sync {
    async fn event_info(&self, event_id: EventId) -> Option<EventInfo>;
}

/// In-memory catalog
#[derive(Default)]
pub struct StaticCatalog {
    events: DashMap<EventId, EventInfo>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, event_id: EventId, name: &str, date: Option<DateTime<Utc>>) {
        self.events.insert(
            event_id,
            EventInfo {
                name: name.to_string(),
                date,
            },
        );
    }
}

#[async_trait]
impl EventCatalog for StaticCatalog {
    async fn event_info(&self, event_id: EventId) -> Option<EventInfo> {
        self.events.get(&event_id).map(|info| info.clone())
    }
}
