//! Reflex core: finding dispatch and containment workflow engine.
//!
//! A threat-detection finding is parsed, matched to a workflow by its type,
//! and the workflow isolates, snapshots, terminates and reports on the
//! compromised instance:
//!
//! - **Finding parser** ([`finding`]): pulls the type, id, instance id and
//!   remote peer out of a raw record.
//! - **Handler registry** ([`registry`]): finding type → workflow constructor.
//! - **Configuration resolver** ([`parameters`]): cached parameter lookups.
//! - **Containment workflow** ([`workflow`]): the lock-guarded state machine.
//! - **Dispatcher** ([`dispatch`]): runs a batch, one finding at a time.
//!
//! Remote side effects go through the [`gateway::ResourceGateway`] trait.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod finding;
pub mod gateway;
pub mod parameters;
pub mod registry;
pub mod workflow;

pub use config::{ContainmentConfig, LockReleasePolicy, ReflexConfig, load_config};
pub use dispatch::{DispatchResponse, DispatchSummary, Dispatcher, FindingBatch};
pub use error::{ConfigError, EventError, FindingError, GatewayError, ParameterError, ReflexError};
pub use finding::Finding;
pub use gateway::{DryRunGateway, MockGateway, ResourceGateway, ResourceTag};
pub use parameters::{ConfigResolver, ParameterCache, ParameterSource, StaticParameterSource};
pub use registry::HandlerRegistry;
pub use workflow::{
    ContainmentState, ContainmentWorkflow, Outcome, SkipReason, WorkflowContext,
    WorkflowConstructor, WorkflowReport,
};
