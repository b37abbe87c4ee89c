pub mod ad;
pub mod alert;
pub mod config;
pub mod conformance;
pub mod health;
pub mod loudness;
pub mod segment;
pub mod stream;
pub mod telemetry;
pub mod webhook;
