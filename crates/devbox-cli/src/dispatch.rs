use color_eyre::Result;
use devbox_core::{
    apply_project, lock_project, verify_project, ApplyRequest, CommandContext, CommandGroup,
    CommandInfo, ExecutionOutcome, LockRequest, UserError, VerifyRequest,
};

use crate::cli::{ApplyArgs, CommandGroupCli, LockArgs, VerifyArgs};

pub fn dispatch_command(
    ctx: &CommandContext,
    group: &CommandGroupCli,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    match group {
        CommandGroupCli::Lock(args) => {
            let info = CommandInfo::new(CommandGroup::Lock, "lock");
            let request = lock_request_from_args(args);
            core_call(info, || lock_project(ctx, &request))
        }
        CommandGroupCli::Verify(args) => {
            let info = CommandInfo::new(CommandGroup::Verify, "verify");
            let request = verify_request_from_args(args);
            core_call(info, || verify_project(ctx, &request))
        }
        CommandGroupCli::Apply(args) => {
            let info = CommandInfo::new(CommandGroup::Apply, "apply");
            let request = apply_request_from_args(args);
            core_call(info, || apply_project(ctx, &request))
        }
    }
}

fn lock_request_from_args(args: &LockArgs) -> LockRequest {
    LockRequest {
        project: args.project.clone(),
        output: args.output.clone(),
    }
}

fn verify_request_from_args(args: &VerifyArgs) -> VerifyRequest {
    VerifyRequest {
        project: args.project.clone(),
        lock: args.lock.clone(),
    }
}

fn apply_request_from_args(args: &ApplyArgs) -> ApplyRequest {
    ApplyRequest {
        project: args.project.clone(),
        lock: args.lock.clone(),
        dry_run: args.dry_run,
    }
}

fn core_call<F>(info: CommandInfo, action: F) -> Result<(CommandInfo, ExecutionOutcome)>
where
    F: FnOnce() -> anyhow::Result<ExecutionOutcome>,
{
    match action() {
        Ok(result) => Ok((info, result)),
        Err(err) => {
            if let Some(user) = err.downcast_ref::<UserError>() {
                return Ok((
                    info,
                    ExecutionOutcome::user_error(user.message().to_string(), user.details().clone()),
                ));
            }
            tracing::debug!(error = ?err, "command failed");
            let issues: Vec<String> = err.chain().map(std::string::ToString::to_string).collect();
            Ok((
                info,
                ExecutionOutcome::failure(
                    err.to_string(),
                    serde_json::json!({
                        "reason": "internal_error",
                        "error": err.to_string(),
                        "issues": issues,
                        "hint": "Re-run with -v for more detail.",
                    }),
                ),
            ))
        }
    }
}
