//! Azure Resource Graph inventory query API.

use std::future::Future;
use std::pin::Pin;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;

pub const RESOURCE_GRAPH_API_VERSION: &str = "2022-10-01";

/// Boxed future returned by the API traits.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = ClientResult<T>> + Send + 'a>>;

/// Request body for `POST /providers/Microsoft.ResourceGraph/resources`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub subscriptions: Vec<String>,
    pub query: String,
    pub options: QueryRequestOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequestOptions {
    pub result_format: String,
    #[serde(rename = "$skipToken", default, skip_serializing_if = "Option::is_none")]
    pub skip_token: Option<String>,
}

impl QueryRequest {
    /// An object-array query; an empty `skip_token` requests the first page.
    pub fn new(query: impl Into<String>, subscriptions: Vec<String>, skip_token: Option<String>) -> Self {
        Self {
            subscriptions,
            query: query.into(),
            options: QueryRequestOptions {
                result_format: "objectArray".to_string(),
                skip_token: skip_token.filter(|t| !t.is_empty()),
            },
        }
    }
}

/// Whether the service cut the result short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultTruncated {
    True,
    False,
}

/// Response envelope. Every field is optional so callers can tell a
/// structurally incomplete response apart from an empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub total_records: Option<i64>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub result_truncated: Option<ResultTruncated>,
    #[serde(rename = "$skipToken", default)]
    pub skip_token: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Paginated inventory query.
pub trait InventoryApi: Send + Sync {
    fn query<'a>(&'a self, request: &'a QueryRequest, deadline: Deadline) -> ApiFuture<'a, QueryResponse>;
}

/// HTTP implementation against the management endpoint.
#[derive(Clone)]
pub struct ResourceGraphClient {
    transport: Transport,
    url: Url,
}

impl ResourceGraphClient {
    pub fn new(transport: Transport, management_endpoint: &str) -> ClientResult<Self> {
        let mut url = Url::parse(management_endpoint).map_err(|e| ClientError::InvalidEndpoint {
            endpoint: management_endpoint.to_string(),
            reason: e.to_string(),
        })?;
        url.set_path("/providers/Microsoft.ResourceGraph/resources");
        url.set_query(Some(&format!("api-version={RESOURCE_GRAPH_API_VERSION}")));
        Ok(Self { transport, url })
    }
}

impl InventoryApi for ResourceGraphClient {
    fn query<'a>(&'a self, request: &'a QueryRequest, deadline: Deadline) -> ApiFuture<'a, QueryResponse> {
        Box::pin(async move {
            let builder = self.transport.client().post(self.url.clone()).json(request);
            self.transport.send_json(builder, deadline).await
        })
    }
}
