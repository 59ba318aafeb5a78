//! Applies a synthesis stage by stage through a [`Provisioner`].
//!
//! Stages run strictly in order. Inside a stage, operations whose
//! dependencies are satisfied are provisioned concurrently.
//!
//! [`Provisioner`]: rigging_core::Provisioner

pub mod applier;
pub mod dry_run;

pub use applier::{
    ApplyEvent, ApplyOptions, ApplyResult, OperationState, StageApplier, StageState,
};
pub use dry_run::DryRunProvisioner;
