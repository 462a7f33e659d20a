//! # Charge Tracker - state of charge estimation for small EV batteries
//!
//! Estimates the state of charge of a vehicle whose battery management system
//! does not report it (the BMW CE-02 and its 1 kW charger) by integrating
//! charging power over time. Power comes either from a fixed two-phase
//! charger profile or from an external power sensor on the charger's plug.
//!
//! ## Features
//!
//! - **Two power models**: fixed CC/CV-style profile or measured sensor power
//! - **Session detection**: automatic from measured power, or explicit commands
//! - **Time estimates**: time to the phase threshold and to full
//! - **Observers**: change callbacks plus a watch channel with the latest status
//! - **Persistence**: snapshots that survive restarts, with lenient restore
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `power`: Power models and external power sources
//! - `estimator`: Session state machine, integration and time estimates
//! - `observers`: Change notification fan-out
//! - `persistence`: Snapshot export, restore and file storage
//! - `sensors`: Display values derived from the estimator status
//! - `scheduler`: Periodic heartbeat task

pub mod config;
pub mod error;
pub mod estimator;
pub mod logging;
pub mod observers;
pub mod persistence;
pub mod power;
pub mod scheduler;
pub mod sensors;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, TrackerError};
pub use estimator::{ChargeEstimator, ChargeStatus, EstimatorConfig, SessionTimePolicy};
pub use persistence::{PersistedSnapshot, StateStore};
pub use power::{PowerModel, PowerReading, PowerSource};
