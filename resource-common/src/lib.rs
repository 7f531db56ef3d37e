//! Shared building blocks for the resource lifecycle managers: the once-guard that owns a
//! resource handle, the failure policy applied to it, and the errors, config values and
//! metrics common to every manager.

pub mod cell;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod policy;

pub use cell::{ResourceCell, ResourceState};
pub use error::{LifecycleError, LifecycleResult};
pub use policy::{ExitProcess, OnInitFailure, Terminate};
