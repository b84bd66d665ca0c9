#![deny(clippy::all, warnings)]

mod core;

pub use crate::core::config::context::{CommandContext, CommandInfo};
pub use crate::core::config::{Config, GlobalOptions, PoolConfig};
pub use crate::core::runtime::effects::{
    Effects, ImageIdentity, SandboxExecutor, SandboxInspector, SharedEffects, SystemEffects,
};
pub use crate::core::runtime::pool::{Task, TaskError, WorkerPool};
pub use crate::core::runtime::process::RunOutput;
pub use crate::core::runtime::CommandGroup;
pub use crate::core::sandbox::ContainerCli;
pub use crate::core::tooling::diagnostics::commands as diag_commands;
pub use crate::core::tooling::outcome::{CommandStatus, ExecutionOutcome, UserError};

pub use crate::core::lock::{
    apply_project, lock_project, verify_project, ApplyRequest, LockRequest, VerifyRequest,
};

pub use crate::core::runtime::{format_status_message, to_json_response};
