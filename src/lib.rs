//! ScanTest backend: turns a photo of study material into a ten-question
//! multiple-choice practice test and runs the quiz.
//!
//! The binary in `main.rs` only wires telemetry, state and the router; all
//! behaviour lives in these modules so the integration tests can drive it.

pub mod config;
pub mod domain;
pub mod error;
pub mod openai;
pub mod pipeline;
pub mod protocol;
pub mod quiz;
pub mod results;
pub mod routes;
pub mod service;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod util;
