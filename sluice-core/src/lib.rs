//! Sluice Core
//!
//! Core types and pure logic for the sluice pipeline-run controller.
//!
//! This crate contains:
//! - Domain types: runs, conditions, execution templates, timeouts
//! - Clock abstraction used for every elapsed-time decision
//! - Process-wide defaults and the user-error marker

pub mod clock;
pub mod config;
pub mod domain;
pub mod duration;
pub mod error;
