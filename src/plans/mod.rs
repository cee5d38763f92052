//! Ready-made plans built on the engine.

pub mod wireguard;

pub use wireguard::{deployment_plan, DeployError};
