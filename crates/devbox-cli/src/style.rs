use color_eyre::owo_colors::{OwoColorize, Style as Paint};
use devbox_core::CommandStatus;

/// Terminal styling, disabled for pipes, `--no-color` and `NO_COLOR`.
pub struct Style {
    enabled: bool,
}

impl Style {
    pub fn new(force_no_color: bool, is_tty: bool) -> Self {
        let env_no_color = std::env::var_os("NO_COLOR").is_some();
        Self {
            enabled: is_tty && !force_no_color && !env_no_color,
        }
    }

    pub fn status(&self, status: &CommandStatus, text: &str) -> String {
        let (symbol, paint) = match status {
            CommandStatus::Ok => ("✔", Paint::new().green().bold()),
            CommandStatus::UserError => ("✗", Paint::new().yellow().bold()),
            CommandStatus::Failure => ("✖", Paint::new().red().bold()),
        };
        self.apply(&format!("{symbol} {text}"), paint)
    }

    pub fn info(&self, text: &str) -> String {
        self.apply(text, Paint::new().cyan())
    }

    pub fn command(&self, text: &str) -> String {
        self.apply(text, Paint::new().dimmed())
    }

    pub fn error_header(&self, text: &str) -> String {
        self.apply(text, Paint::new().red().bold())
    }

    pub fn fix_bullet(&self, text: &str) -> String {
        self.apply(text, Paint::new().green())
    }

    fn apply(&self, text: &str, paint: Paint) -> String {
        if self.enabled {
            text.style(paint).to_string()
        } else {
            text.to_string()
        }
    }
}
