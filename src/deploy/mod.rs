//! Deploy engine: the orchestrator, its collaborators and the result stream.
//!
//! A run is driven through [`Orchestrator::deploy`] or
//! [`Orchestrator::check_status`]; every observable effect is reported as a
//! [`DeployResult`] to a [`Progress`] sink in order.
pub mod cancel;
pub mod confirm;
pub mod context;
pub mod install;
pub mod links;
mod module;
pub mod orchestrator;
pub mod progress;
pub mod result;
pub mod snapshot;
mod status;
pub mod templates;

pub use cancel::CancellationToken;
pub use confirm::{AlwaysProceed, Confirmer, ModuleAction, PromptConfirmer};
pub use context::Context;
pub use orchestrator::{DeployOptions, Orchestrator};
pub use progress::{CollectingProgress, Progress};
pub use result::{DeployEventType, DeployResult, ResultLevel};
pub use snapshot::{
    FsSnapshotProvider, RestoreOutcome, RestoreResult, SnapshotInfo, SnapshotProvider,
};
