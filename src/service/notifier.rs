//! Outcome fan-out.
//!
//! Follows the bid log and delivers every recorded outcome to an external
//! collaborator (notification service, cache invalidation), so dependent
//! read models like item detail pages can refresh. Delivery is fire and
//! forget: a failed POST is logged and skipped, never blocks the follower.

use crate::auction::Bid;
use crate::persistence::{Persistence, TransactionOf};
use crate::service::{LogFollowerService, ServiceId};
use anyhow::Result;
use reqwest::{blocking::Client, Url};
use tracing::{debug, warn};

pub const OUTCOME_NOTIFIER_SERVICE_ID: &str = "outcome-notifier";

pub struct OutcomeNotifier {
    endpoint: Option<Url>,
    http: Client,
}

impl OutcomeNotifier {
    pub fn new(endpoint: Option<Url>) -> Self {
        Self {
            endpoint,
            http: Client::new(),
        }
    }
}

impl<P: Persistence> LogFollowerService<P> for OutcomeNotifier {
    fn progress_id(&self) -> ServiceId {
        OUTCOME_NOTIFIER_SERVICE_ID.to_owned()
    }

    fn handle_bid<'a>(
        &mut self,
        _transaction: &mut TransactionOf<'a, P>,
        bid: Bid,
    ) -> Result<()> {
        let Some(endpoint) = &self.endpoint else {
            debug!(bid = bid.id, "no notify endpoint configured, skipping");
            return Ok(());
        };

        match self
            .http
            .post(endpoint.clone())
            .json(&bid)
            .send()
            .and_then(|response| response.error_for_status())
        {
            Ok(_) => debug!(bid = bid.id, item = %bid.item, "outcome delivered"),
            Err(e) => warn!(bid = bid.id, "failed to deliver outcome: {}", e),
        }
        Ok(())
    }
}
