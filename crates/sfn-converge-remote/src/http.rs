//! HTTP client for the remote state machine API.
//!
//! Requests use the JSON 1.0 protocol: every operation is a `POST /` with an
//! `X-Amz-Target: AWSStepFunctions.<Operation>` header and a JSON body. Errors
//! come back as `{"__type": "<namespace>#<Code>", "message": "..."}`.
//!
//! Requests are not signed. Point the client at an endpoint that accepts
//! unsigned requests, such as a local emulator or a signing proxy.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sfn_converge_core::{ResourceIdentity, TagSet};

use crate::client::StateMachineClient;
use crate::error::{RemoteError, Result};
use crate::types::{
    tags_from_wire, tags_to_wire, CreateStateMachineInput, CreateStateMachineOutput,
    DescribeStateMachineOutput, Tag, UpdateStateMachineInput,
};

const TARGET_PREFIX: &str = "AWSStepFunctions";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// Configuration for [`HttpStateMachineClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Base URL of the endpoint.
    pub endpoint: String,
    /// Per-request timeout in seconds.
    pub request_timeout_seconds: u64,
    /// Connection timeout in seconds.
    pub connect_timeout_seconds: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8083".to_string(),
            request_timeout_seconds: 30,
            connect_timeout_seconds: 5,
        }
    }
}

impl HttpClientConfig {
    /// Create a config for the given endpoint with default timeouts.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `SFN_CONVERGE_ENDPOINT`: base URL of the endpoint
    /// - `SFN_CONVERGE_REQUEST_TIMEOUT_SECONDS`: per-request timeout
    /// - `SFN_CONVERGE_CONNECT_TIMEOUT_SECONDS`: connection timeout
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SFN_CONVERGE_ENDPOINT") {
            config.endpoint = val;
        }
        if let Ok(val) = std::env::var("SFN_CONVERGE_REQUEST_TIMEOUT_SECONDS") {
            if let Ok(n) = val.parse() {
                config.request_timeout_seconds = n;
            }
        }
        if let Ok(val) = std::env::var("SFN_CONVERGE_CONNECT_TIMEOUT_SECONDS") {
            if let Ok(n) = val.parse() {
                config.connect_timeout_seconds = n;
            }
        }

        config
    }
}

/// A [`StateMachineClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStateMachineClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStateMachineClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Transport` if the HTTP client cannot be built.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| RemoteError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, config.endpoint))
    }

    /// Create a client around a pre-configured `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// The endpoint this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<I, O>(&self, operation: &str, input: &I) -> Result<O>
    where
        I: Serialize + Sync,
        O: DeserializeOwned,
    {
        let body = serde_json::to_vec(input)
            .map_err(|e| RemoteError::Malformed(format!("cannot encode {operation} request: {e}")))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(format!("{operation}: {e}")))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport(format!("{operation}: {e}")))?;

        if status.is_success() {
            let payload: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
            return serde_json::from_slice(payload).map_err(|e| {
                RemoteError::Malformed(format!("{operation} response: {e}"))
            });
        }

        let error = parse_error(status, &bytes);
        tracing::debug!(
            operation,
            status = %status,
            error = %error,
            "Remote request rejected"
        );
        Err(error)
    }
}

/// Error payload of the JSON 1.0 protocol.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

fn parse_error(status: reqwest::StatusCode, bytes: &[u8]) -> RemoteError {
    let body: Option<ErrorBody> = serde_json::from_slice(bytes).ok();
    let message = body
        .as_ref()
        .and_then(|b| b.message.clone())
        .unwrap_or_default();

    match body.and_then(|b| b.error_type) {
        Some(error_type) => {
            let code = error_type
                .rsplit_once('#')
                .map_or(error_type.as_str(), |(_, code)| code);
            RemoteError::api(code, message)
        }
        None => RemoteError::Malformed(format!("HTTP {status} without an error type")),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StateMachineArnInput<'a> {
    state_machine_arn: &'a ResourceIdentity,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceArnInput<'a> {
    resource_arn: &'a ResourceIdentity,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TagResourceInput<'a> {
    resource_arn: &'a ResourceIdentity,
    tags: Vec<Tag>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UntagResourceInput<'a> {
    resource_arn: &'a ResourceIdentity,
    tag_keys: &'a BTreeSet<String>,
}

#[derive(Deserialize)]
struct ListTagsOutput {
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Deserialize)]
struct Empty {}

#[async_trait]
impl StateMachineClient for HttpStateMachineClient {
    async fn create_state_machine(
        &self,
        input: &CreateStateMachineInput,
    ) -> Result<CreateStateMachineOutput> {
        self.call("CreateStateMachine", input).await
    }

    async fn describe_state_machine(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<DescribeStateMachineOutput> {
        self.call(
            "DescribeStateMachine",
            &StateMachineArnInput {
                state_machine_arn: identity,
            },
        )
        .await
    }

    async fn update_state_machine(&self, input: &UpdateStateMachineInput) -> Result<()> {
        let _: Empty = self.call("UpdateStateMachine", input).await?;
        Ok(())
    }

    async fn delete_state_machine(&self, identity: &ResourceIdentity) -> Result<()> {
        let _: Empty = self
            .call(
                "DeleteStateMachine",
                &StateMachineArnInput {
                    state_machine_arn: identity,
                },
            )
            .await?;
        Ok(())
    }

    async fn list_tags(&self, identity: &ResourceIdentity) -> Result<TagSet> {
        let output: ListTagsOutput = self
            .call(
                "ListTagsForResource",
                &ResourceArnInput {
                    resource_arn: identity,
                },
            )
            .await?;
        Ok(tags_from_wire(output.tags))
    }

    async fn tag_resource(&self, identity: &ResourceIdentity, tags: &TagSet) -> Result<()> {
        let _: Empty = self
            .call(
                "TagResource",
                &TagResourceInput {
                    resource_arn: identity,
                    tags: tags_to_wire(tags),
                },
            )
            .await?;
        Ok(())
    }

    async fn untag_resource(
        &self,
        identity: &ResourceIdentity,
        keys: &BTreeSet<String>,
    ) -> Result<()> {
        let _: Empty = self
            .call(
                "UntagResource",
                &UntagResourceInput {
                    resource_arn: identity,
                    tag_keys: keys,
                },
            )
            .await?;
        Ok(())
    }
}
