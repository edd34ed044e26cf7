//! Remote control-plane boundary for sfn-converge.
//!
//! This crate provides the [`StateMachineClient`] trait the reconciliation
//! engine drives, the wire types it exchanges, and two implementations:
//!
//! - [`HttpStateMachineClient`], speaking the JSON 1.0 protocol to an endpoint
//!   that accepts unsigned requests (a local emulator or a signing proxy)
//! - `MockStateMachineClient` (behind the `test-utils` feature), an in-memory
//!   control plane with scripted failures and propagation lag
//!
//! # Example
//!
//! ```no_run
//! use sfn_converge_remote::{HttpClientConfig, HttpStateMachineClient, StateMachineClient};
//! use sfn_converge_core::ResourceIdentity;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpStateMachineClient::new(HttpClientConfig::with_endpoint("http://localhost:8083"))?;
//!
//! let identity = ResourceIdentity::parse(
//!     "arn:aws:states:us-east-1:123456789012:stateMachine:orders",
//! )?;
//! let observed = client.describe_state_machine(&identity).await?;
//! println!("{} is {}", observed.name, observed.status_label());
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature to use the mock control plane:
//!
//! ```ignore
//! use sfn_converge_remote::{MockStateMachineClient, StateMachineClient};
//!
//! let remote = MockStateMachineClient::new();
//! remote.set_update_lag(2);
//! assert_eq!(remote.calls().create, 0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod http;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use client::StateMachineClient;
pub use error::{codes, RemoteError, Result};
pub use http::{HttpClientConfig, HttpStateMachineClient};
pub use types::{
    CloudWatchLogsLogGroup, CreateStateMachineInput, CreateStateMachineOutput,
    DescribeStateMachineOutput, LogDestination, LoggingConfiguration, StateMachineStatus, Tag,
    TracingConfiguration, UpdateStateMachineInput,
};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{mock_identity, CallCounts, MockOperation, MockStateMachineClient};
