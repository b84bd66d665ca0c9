use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

pub const DEVBOX_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

pub const DEVBOX_BEFORE_HELP: &str = concat!(
    "devbox ",
    env!("CARGO_PKG_VERSION"),
    " – Reproducible sandbox environments\n\n",
    "\x1b[1;36mCommands\x1b[0m\n",
    "  lock             Record the sandbox's packages, registries and sources in devbox.lock.json.\n",
    "  verify           Compare the live sandbox against its lock; non-zero exit on drift.\n",
    "  apply            Restore locked sources and registries, then install and remove packages.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "devbox",
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = DEVBOX_BEFORE_HELP,
    help_template = DEVBOX_HELP_TEMPLATE
)]
pub struct DevboxCli {
    #[arg(
        short,
        long,
        help = "Suppress human output; errors still print to stderr",
        global = true
    )]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)", global = true)]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(
        about = "Record the sandbox's current state into a lock file.",
        override_usage = "devbox lock <PROJECT> [-o PATH]",
        after_help = "Examples:\n  devbox lock web\n  devbox lock web -o locks/web.json\n"
    )]
    Lock(LockArgs),
    #[command(
        about = "Check the live sandbox against its lock file.",
        override_usage = "devbox verify <PROJECT> [--lock PATH]",
        after_help = "Examples:\n  devbox verify web\n  devbox verify web --json\n"
    )]
    Verify(VerifyArgs),
    #[command(
        about = "Converge the sandbox to its lock file.",
        override_usage = "devbox apply <PROJECT> [--lock PATH] [--dry-run]",
        after_help = "Examples:\n  devbox apply web --dry-run\n  devbox apply web\n"
    )]
    Apply(ApplyArgs),
}

#[derive(Args, Debug)]
pub struct LockArgs {
    #[arg(value_name = "PROJECT", help = "Project name from the devbox registry")]
    pub project: String,
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Write the lock here instead of <workspace>/devbox.lock.json"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[arg(value_name = "PROJECT", help = "Project name from the devbox registry")]
    pub project: String,
    #[arg(long, value_name = "PATH", help = "Lock file to compare against")]
    pub lock: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[arg(value_name = "PROJECT", help = "Project name from the devbox registry")]
    pub project: String,
    #[arg(long, value_name = "PATH", help = "Lock file to apply")]
    pub lock: Option<PathBuf>,
    #[arg(long, help = "Show the commands that would run without running them")]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        DevboxCli::command().debug_assert();
    }

    #[test]
    fn globals_parse_after_subcommand() {
        let cli = DevboxCli::parse_from(["devbox", "apply", "web", "--dry-run", "--json", "-vv"]);
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            CommandGroupCli::Apply(args) => {
                assert_eq!(args.project, "web");
                assert!(args.dry_run);
                assert!(args.lock.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn lock_accepts_output_path() {
        let cli = DevboxCli::parse_from(["devbox", "lock", "web", "-o", "out.json"]);
        match cli.command {
            CommandGroupCli::Lock(args) => {
                assert_eq!(args.output, Some(PathBuf::from("out.json")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
