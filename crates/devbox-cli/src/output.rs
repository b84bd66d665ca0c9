use atty::Stream;
use color_eyre::Result;
use devbox_core::{diag_commands, CommandGroup, CommandInfo, CommandStatus, ExecutionOutcome};
use serde_json::Value;

use crate::style::Style;

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

pub fn emit_output(opts: &OutputOptions, info: CommandInfo, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.status.exit_code();
    let style = Style::new(opts.no_color, atty::is(Stream::Stdout));

    if opts.json {
        let payload = devbox_core::to_json_response(info, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if let CommandStatus::Ok = outcome.status {
        if !opts.quiet {
            let message = devbox_core::format_status_message(info, &outcome.message);
            println!("{}", style.status(&outcome.status, &message));
            for line in planned_commands(&outcome.details) {
                println!("{}", style.command(&format!("  $ {line}")));
            }
            if let Some(hint) = hint_from_details(&outcome.details) {
                println!("{}", style.info(&format!("Tip: {hint}")));
            }
        }
    } else if opts.quiet {
        let plain = Style::new(true, false);
        for line in error_lines(&plain, info, outcome) {
            eprintln!("{line}");
        }
    } else {
        for line in error_lines(&style, info, outcome) {
            println!("{line}");
        }
    }

    Ok(code)
}

/// The diagnostic block for a failed command: code and message, then the
/// `Why:` and `Fix:` sections.
fn error_lines(style: &Style, info: CommandInfo, outcome: &ExecutionOutcome) -> Vec<String> {
    let header = format!("{}  {}", error_code(info, &outcome.details), outcome.message);
    let mut lines = vec![style.error_header(&header), String::new(), "Why:".to_string()];
    for reason in collect_why_bullets(&outcome.details, &outcome.message) {
        lines.push(format!("  • {reason}"));
    }
    let fixes = collect_fix_bullets(&outcome.details);
    if !fixes.is_empty() {
        lines.push(String::new());
        lines.push("Fix:".to_string());
        for fix in fixes {
            lines.push(style.fix_bullet(&format!("  • {fix}")));
        }
    }
    lines
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

/// Commands listed by a dry run: source configuration first, then every
/// planned package action.
fn planned_commands(details: &Value) -> Vec<&str> {
    if !details.get("dry_run").and_then(Value::as_bool).unwrap_or(false) {
        return Vec::new();
    }
    let mut lines: Vec<&str> = details
        .get("configuration")
        .and_then(Value::as_array)
        .map(|commands| commands.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    for group in details
        .get("plan")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        for action in group
            .get("actions")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let Some(command) = action.get("command").and_then(Value::as_str) {
                lines.push(command);
            }
        }
    }
    lines
}

fn error_code<'a>(info: CommandInfo, details: &'a Value) -> &'a str {
    if let Some(code) = details.get("code").and_then(Value::as_str) {
        return code;
    }
    match info.group {
        CommandGroup::Lock => diag_commands::LOCK,
        CommandGroup::Verify => diag_commands::VERIFY,
        CommandGroup::Apply => diag_commands::APPLY,
    }
}

fn collect_why_bullets(details: &Value, fallback: &str) -> Vec<String> {
    let mut bullets = Vec::new();
    if let Some(reason) = details.get("reason").and_then(Value::as_str) {
        push_unique(
            &mut bullets,
            reason_display(reason).unwrap_or(reason).to_string(),
        );
    }
    if let Some(drift) = details.get("drift").and_then(Value::as_array) {
        for finding in drift {
            if let Some(message) = finding.get("message").and_then(Value::as_str) {
                push_unique(&mut bullets, message);
            }
        }
    }
    if let Some(results) = details.get("results").and_then(Value::as_array) {
        for report in results {
            let Some(failed) = report.get("failed") else {
                continue;
            };
            let manager = report.get("manager").and_then(Value::as_str).unwrap_or("?");
            let command = failed.get("command").and_then(Value::as_str).unwrap_or_default();
            let error = failed.get("error").and_then(Value::as_str).unwrap_or_default();
            let exit = failed
                .get("exit_code")
                .and_then(Value::as_i64)
                .map(|code| format!(" (exit {code})"))
                .unwrap_or_default();
            push_unique(&mut bullets, format!("{manager}: `{command}` failed{exit}: {error}"));
        }
    }
    if let Some(command) = details.get("command").and_then(Value::as_str) {
        let stderr = details.get("stderr").and_then(Value::as_str).unwrap_or_default();
        push_unique(&mut bullets, format!("`{command}`: {stderr}"));
    }
    if let Some(issues) = details.get("issues").and_then(Value::as_array) {
        for issue in issues.iter().filter_map(Value::as_str) {
            push_unique(&mut bullets, issue);
        }
    }
    if bullets.is_empty() {
        bullets.push(fallback.to_string());
    }
    bullets
}

fn collect_fix_bullets(details: &Value) -> Vec<String> {
    let mut fixes = Vec::new();
    if let Some(hint) = hint_from_details(details) {
        push_unique(&mut fixes, hint.to_string());
    }
    if fixes.is_empty() {
        fixes.push("Re-run with --help for usage or inspect the output above.".to_string());
    }
    fixes
}

fn push_unique(vec: &mut Vec<String>, text: impl Into<String>) {
    let entry = text.into();
    if entry.trim().is_empty() {
        return;
    }
    if !vec.iter().any(|existing| existing == &entry) {
        vec.push(entry);
    }
}

fn reason_display(code: &str) -> Option<&'static str> {
    match code {
        "drift" => Some("The sandbox no longer matches its lock file."),
        "missing_lock" => Some("No lock file was found for this project."),
        "unknown_project" => Some("The project is not in the devbox registry."),
        "lock_invalid" => Some("The lock file is not valid JSON."),
        "lock_version_unsupported" => Some("The lock file was written by an incompatible devbox."),
        "lock_entry_malformed" => Some("The lock file contains a malformed package entry."),
        "lock_entry_duplicate" => Some("The lock file lists a package more than once."),
        "configuration_failed" => Some("Restoring sources or registries failed."),
        "reconcile_failed" => Some("One or more package managers could not be reconciled."),
        "lock_unreadable" => Some("The lock file could not be read."),
        "backend_not_found" | "backend_unavailable" => {
            Some("No container backend (docker or podman) was found.")
        }
        "sandbox_missing" => Some("The project's sandbox container does not exist."),
        "sandbox_start_failed" | "sandbox_not_running" => Some("The sandbox could not be started."),
        "home_unknown" => Some("The devbox home directory could not be determined."),
        _ => None,
    }
}
