#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Disk Sweeper
//!
//! Mark-and-sweep lifecycle management for cloud block-storage volumes that
//! back orchestrated-cluster persistent volumes.
//!
//! ## Overview
//!
//! Each invocation is a single finite pass over a snapshot-in-time inventory
//! of volumes. Two independent, sequential pipelines share one decision
//! vocabulary:
//!
//! - **Mark Pipeline**: lists volumes matching a selection filter, runs each
//!   through the decision engine, and mutates the `marked-for-deletion` label.
//! - **Cleanup Pipeline**: lists volumes already labeled for deletion,
//!   re-verifies the label invariant, optionally snapshots, then deletes.
//!
//! The label state stored by the compute service is the sole durable memory
//! of prior decisions. There is no control loop, no watch, and no local state.
//!
//! ## Module Organization
//!
//! - [`decision`] - Pure decision engine mapping volume state to an action
//! - [`labels`] - Label vocabulary and the cleanup label invariant
//! - [`compute`] - Compute Disk Service contract and REST binding
//! - [`pipeline`] - Mark and Cleanup pipelines
//! - [`outcome`] - Per-volume outcome events streamed to the caller
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Safety Properties
//!
//! - A volume is deleted only when its label map literally carries
//!   `marked-for-deletion: "true"`, re-checked locally against the fetched
//!   record regardless of the server-side filter.
//! - When a safety snapshot is requested, the delete call is issued only
//!   after the snapshot operation reaches a terminal state.
//! - With dry run enabled, no mutating call is ever issued.
//! - Label mutations carry the fingerprint captured at fetch time, so a
//!   concurrent external mutation is rejected by the service rather than
//!   silently overwritten.

pub mod compute;
pub mod config;
pub mod decision;
pub mod error;
pub mod labels;
pub mod logging;
pub mod outcome;
pub mod pipeline;

pub use config::SweeperConfig;
pub use decision::{decide, Action, Decision, DecisionError, Diagnostic};
pub use error::{ItemError, Result, SweeperError};
pub use outcome::{FailureStage, OutcomeDetail, OutcomeEvent, OutcomePublisher, VolumeIdentity};
pub use pipeline::{CleanupPipeline, MarkPipeline, PipelineError, RunSummary};
