//! Core domain types and logic.

pub mod bounds;
pub mod calendar;
pub mod config_validation;
pub mod context;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod portfolio;
pub mod sequence;
pub mod series;
pub mod statistics;
pub mod timeline;
pub mod universe;
