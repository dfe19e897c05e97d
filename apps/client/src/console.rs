//! Human readable output
//!
//! Diagnostics go through `tracing` on stderr. Everything the user is meant to
//! read while a session runs is rendered here and printed on stdout.

use chrono::Local;
use crossterm::{style::Stylize, tty::IsTty};
use hookrelay_common::{format_bytes, format_duration};
use std::time::Duration;

/// One forwarded delivery, as shown to the user
#[derive(Debug, Clone)]
pub struct ForwardSummary<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub request_bytes: usize,
    pub status: u16,
    pub response_bytes: usize,
    /// Set when the local service did not answer in time
    pub timeout: Option<Duration>,
}

/// Formats status lines, with ANSI colors when stdout is a terminal
#[derive(Debug, Clone, Copy)]
pub struct Console {
    colors: bool,
}

impl Console {
    pub fn new(use_colors: bool) -> Self {
        Self {
            colors: use_colors && std::io::stdout().is_tty(),
        }
    }

    /// Console that never emits escape codes
    pub fn plain() -> Self {
        Self { colors: false }
    }

    pub fn bold(&self, message: &str) -> String {
        if self.colors {
            message.bold().to_string()
        } else {
            message.to_string()
        }
    }

    pub fn green(&self, message: &str) -> String {
        if self.colors {
            message.green().to_string()
        } else {
            message.to_string()
        }
    }

    pub fn red(&self, message: &str) -> String {
        if self.colors {
            message.red().to_string()
        } else {
            message.to_string()
        }
    }

    /// Status code on a green, yellow or red background
    pub fn status(&self, status: u16) -> String {
        let label = format!(" {} ", status);
        if !self.colors {
            return label;
        }

        match status {
            s if s >= 400 => label.on_red().white().to_string(),
            s if s >= 300 => label.on_yellow().white().to_string(),
            _ => label.on_green().white().to_string(),
        }
    }

    pub fn forward_line(&self, summary: &ForwardSummary<'_>) -> String {
        let outcome = match summary.timeout {
            Some(timeout) => format!("Timeout ({}) HTTP status", format_duration(timeout)),
            None => "Got HTTP status".to_string(),
        };

        format!(
            "[{}] Relay issued request > Received through tunnel > Local: {} {} (body: {}) > {} {} (body: {}), sent it through tunnel > Relay got response",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.bold(summary.method),
            summary.url,
            format_bytes(summary.request_bytes),
            outcome,
            self.status(summary.status),
            format_bytes(summary.response_bytes),
        )
    }

    pub fn report_forward(&self, summary: &ForwardSummary<'_>) {
        println!("{}", self.forward_line(summary));
    }
}
