//! Core types and utilities for sfn-converge.
//!
//! This crate provides the foundational types shared by the remote boundary and
//! the reconciliation engine:
//!
//! - **Identifiers**: the remote-assigned [`ResourceIdentity`] and name validation
//! - **Declared attributes**: the desired state of a state machine
//! - **Tag policy**: default tags, ignore rules, effective sets and diffs
//! - **Documents**: structural equality for JSON definitions
//!
//! # Example
//!
//! ```
//! use sfn_converge_core::{IgnoreTags, TagPolicy, TagSet};
//!
//! let policy = TagPolicy::new(
//!     TagSet::from_iter([("env", "prod")]),
//!     IgnoreTags::from_keys(["team"]),
//! );
//!
//! let effective = policy.effective(&TagSet::from_iter([("env", "dev"), ("team", "x")]));
//! assert_eq!(effective, TagSet::from_iter([("env", "dev")]));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod desired;
pub mod document;
pub mod error;
pub mod ids;
pub mod tags;

pub use desired::{DesiredState, LogLevel, LoggingBlock, StateMachineType, TracingBlock};
pub use document::{documents_equal, values_equal};
pub use error::{CoreError, Result};
pub use ids::{validate_name, ResourceIdentity};
pub use tags::{IgnoreTags, TagDiff, TagPolicy, TagSet};
