//! Read-only collection of a sandbox's package, registry and source state.

mod packages;
mod sources;

use devbox_domain::{LockPackages, ObservedState};

use crate::core::config::context::CommandContext;
use crate::core::config::PoolConfig;
use crate::core::runtime::pool::{Task, WorkerPool};

pub(crate) use packages::collect_packages;
pub(crate) use sources::{collect_sources, SourceState};

enum Collected {
    Packages(LockPackages),
    Sources(SourceState),
}

/// Width-limited pool for collection commands.
pub(crate) fn query_pool(ctx: &CommandContext) -> WorkerPool {
    WorkerPool::new(ctx.pool().query_width(), ctx.pool().query_timeout)
}

/// Packages and sources run side by side unless parallelism is limited.
fn side_by_side_width(pool: &PoolConfig) -> usize {
    pool.query_width().min(2)
}

/// Collects packages and sources side by side. Anything that fails or times
/// out is observed as empty.
pub(crate) fn collect_observed(ctx: &CommandContext, sandbox: &str) -> ObservedState {
    let executor = ctx.sandbox();
    let inner = query_pool(ctx);
    let outer = WorkerPool::new(side_by_side_width(ctx.pool()), ctx.pool().query_timeout);
    let tasks: Vec<Task<'_, Collected>> = vec![
        Box::new(move || -> anyhow::Result<Collected> {
            Ok(Collected::Packages(collect_packages(executor, sandbox, &inner)))
        }) as Task<'_, Collected>,
        Box::new(move || -> anyhow::Result<Collected> {
            Ok(Collected::Sources(collect_sources(executor, sandbox, &inner)))
        }) as Task<'_, Collected>,
    ];

    let mut observed = ObservedState::default();
    for result in outer.execute(tasks) {
        match result {
            Ok(Collected::Packages(packages)) => observed.packages = packages,
            Ok(Collected::Sources(sources)) => {
                observed.registries = sources.registries;
                observed.apt_sources = sources.apt_sources;
            }
            Err(err) => {
                tracing::warn!(sandbox, error = %err, "collection did not complete; observing none");
            }
        }
    }
    observed
}
