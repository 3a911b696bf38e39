//! Hazard-zone matching and ranking for PAI flood and landslide datasets.
//!
//! A user-drawn geometry is intersected with every configured hazard layer,
//! the competing classifications are ranked, and the most severe one is
//! resolved to its output template and normative reference.

pub mod analysis;
pub mod config;
pub mod error;
pub mod rules;
pub mod store;
pub mod telemetry;
