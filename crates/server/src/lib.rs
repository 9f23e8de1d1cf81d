//! Orchestrator service wiring.

pub mod bootstrap;
