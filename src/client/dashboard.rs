use std::ops::ControlFlow;

use super::{ApiClient, ClientError, EventStream, PushEvent};
use crate::models::{Registration, Stats};
use crate::notify::{CREATED, UPDATED};

/// Locally displayed aggregate + listing.
#[derive(Debug, Clone, Default)]
pub struct Dashboard {
    pub stats: Option<Stats>,
    pub registrations: Vec<Registration>,
    pub refreshes: u64,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_invalidation(event: &PushEvent) -> bool {
        event.name == CREATED || event.name == UPDATED
    }

    /// Re-fetches both views. The listing needs a session; without one it is
    /// left empty rather than failing.
    pub async fn refresh(&mut self, client: &ApiClient) -> Result<(), ClientError> {
        self.stats = Some(client.stats().await?);
        self.registrations = if client.session().is_authenticated().await {
            client.list_registrations().await?
        } else {
            Vec::new()
        };
        self.refreshes += 1;
        Ok(())
    }

    /// Refreshes on every registration event until `after_refresh` breaks or
    /// the stream ends. Event payloads are never merged, they only signal
    /// that the views are stale.
    pub async fn watch<F>(
        &mut self,
        client: &ApiClient,
        events: &mut EventStream,
        mut after_refresh: F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(&Dashboard) -> ControlFlow<()>,
    {
        while let Some(event) = events.next_event().await {
            let event = event?;
            if !Self::is_invalidation(&event) {
                continue;
            }
            log::debug!("{} received, refreshing dashboard", event.name);
            self.refresh(client).await?;
            if after_refresh(self).is_break() {
                break;
            }
        }
        Ok(())
    }
}
