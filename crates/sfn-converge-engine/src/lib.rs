//! Reconciliation engine for sfn-converge.
//!
//! This crate drives a remote resource from whatever state it is in to the
//! declared one, in a single pass, without keeping state between passes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Reconciler                           │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Diff +     │ │  Waiters    │ │    Pass phases      │    │
//! │  │  tag policy │ │  + retry    │ │    (lifecycle)      │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                    ┌───────────────────┐
//!                    │  ResourceAdapter  │  (StateMachineAdapter)
//!                    └───────────────────┘
//!                              │
//!                              ▼
//!                    ┌───────────────────┐
//!                    │StateMachineClient │  (HTTP or mock)
//!                    └───────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use sfn_converge_core::{DesiredState, TagPolicy};
//! use sfn_converge_engine::{CancellationToken, EngineConfig, Reconciler, StateMachineAdapter};
//! use sfn_converge_remote::{HttpClientConfig, HttpStateMachineClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(HttpStateMachineClient::new(HttpClientConfig::from_env())?);
//! let reconciler = Reconciler::new(
//!     StateMachineAdapter::new(client),
//!     EngineConfig::from_env(),
//!     TagPolicy::default(),
//! );
//!
//! let desired = DesiredState::new(
//!     "orders",
//!     "arn:aws:iam::123456789012:role/sfn",
//!     r#"{"StartAt":"A","States":{"A":{"Type":"Pass","End":true}}}"#,
//! );
//! let cancel = CancellationToken::new();
//! let created = reconciler.reconcile(&desired, None, &cancel).await?;
//!
//! // Later passes pass the identity back in.
//! let again = reconciler.reconcile(&desired, Some(&created.identity), &cancel).await?;
//! println!("{:?}", again.outcome);
//! # Ok(())
//! # }
//! ```
//!
//! # Pass phases
//!
//! - `Idle` → `Creating`, `Diffing` or `Deleting`
//! - `Diffing` → `Updating`, `Tagging`, `Creating` (vanished) or `Deleting` (replacement)
//! - `Updating` → `AwaitingFieldSettle` → `Tagging` → `Converged`
//! - `Creating` → `AwaitingCreateTerminal` → `Converged`
//! - `Deleting` → `AwaitingDeletion` → `Converged`, or `Creating` when replacing
//!
//! Any non-terminal phase may move to `Failed`. See [`lifecycle`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod adapter;
pub mod codec;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod reconciler;
pub mod retry;
pub mod state_machine;
pub mod waiter;

pub use adapter::{Field, Lifecycle, ResourceAdapter};
pub use config::EngineConfig;
pub use error::{ErrorKind, Operation, ReconcileError, Result};
pub use lifecycle::Phase;
pub use reconciler::{Outcome, Reconciled, Reconciler};
pub use retry::{RetryError, RetryPolicy, RetryableErrorClass};
pub use state_machine::StateMachineAdapter;
pub use waiter::{SettleWaiter, StateWaiter, WaitError};

pub use tokio_util::sync::CancellationToken;
