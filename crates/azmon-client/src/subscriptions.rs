//! Subscription listing, used at startup to build the fallback list.

use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::deadline::Deadline;
use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;

pub const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionPage {
    #[serde(default)]
    value: Vec<Subscription>,
    #[serde(default)]
    next_link: Option<String>,
}

/// A subscription visible to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Clone)]
pub struct SubscriptionsClient {
    transport: Transport,
    url: Url,
}

impl SubscriptionsClient {
    pub fn new(transport: Transport, management_endpoint: &str) -> ClientResult<Self> {
        let mut url = Url::parse(management_endpoint).map_err(|e| ClientError::InvalidEndpoint {
            endpoint: management_endpoint.to_string(),
            reason: e.to_string(),
        })?;
        url.set_path("/subscriptions");
        url.set_query(Some(&format!("api-version={SUBSCRIPTIONS_API_VERSION}")));
        Ok(Self { transport, url })
    }

    /// All subscriptions, following `nextLink` until exhausted.
    pub async fn list(&self, deadline: Deadline) -> ClientResult<Vec<Subscription>> {
        let mut subscriptions = Vec::new();
        let mut next = Some(self.url.clone());

        while let Some(url) = next.take() {
            let page: SubscriptionPage = self
                .transport
                .send_json(self.transport.client().get(url), deadline)
                .await?;
            debug!(count = page.value.len(), "subscription page");
            subscriptions.extend(page.value);

            next = match page.next_link.filter(|l| !l.is_empty()) {
                Some(link) => Some(Url::parse(&link).map_err(|e| ClientError::InvalidEndpoint {
                    endpoint: link.clone(),
                    reason: e.to_string(),
                })?),
                None => None,
            };
        }

        Ok(subscriptions)
    }

    /// Subscription IDs only.
    pub async fn list_ids(&self, deadline: Deadline) -> ClientResult<Vec<String>> {
        Ok(self
            .list(deadline)
            .await?
            .into_iter()
            .map(|s| s.subscription_id)
            .collect())
    }
}
