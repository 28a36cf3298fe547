//! Human and JSON rendering for command results
//!
//! Commands talk to an [`OutputFormatter`] and never decide between
//! `println!` and JSON themselves. Human output goes to stdout, except
//! warnings and errors which go to stderr in both modes.

use serde_json::{json, Value};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Severity of a single message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Info,
    Warn,
    Error,
}

impl Level {
    fn to_stderr(self) -> bool {
        matches!(self, Level::Warn | Level::Error)
    }
}

/// Renders command output in one format
pub trait OutputFormatter {
    /// Renders `message` at `level`
    fn emit(&self, level: Level, message: &str);

    /// Prints a structured value; human output ignores it
    fn print_json(&self, value: &Value);

    fn format(&self) -> OutputFormat;

    fn success(&self, message: &str) {
        self.emit(Level::Success, message);
    }

    fn info(&self, message: &str) {
        self.emit(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.emit(Level::Error, message);
    }

    /// Reports a daemon reply: `message` for humans, `value` as JSON
    fn reply(&self, message: &str, value: &Value) {
        match self.format() {
            OutputFormat::Json => self.print_json(value),
            OutputFormat::Human => self.success(message),
        }
    }
}

/// Plain text with a status glyph per line
pub struct HumanFormatter;

impl HumanFormatter {
    fn render(level: Level, message: &str) -> String {
        match level {
            Level::Success => format!("\u{2713} {message}"),
            Level::Info => format!("  {message}"),
            Level::Warn => format!("\u{26a0} Warning: {message}"),
            Level::Error => format!("\u{2717} Error: {message}"),
        }
    }
}

impl OutputFormatter for HumanFormatter {
    fn emit(&self, level: Level, message: &str) {
        let line = Self::render(level, message);
        if level.to_stderr() {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }

    fn print_json(&self, _value: &Value) {}

    fn format(&self) -> OutputFormat {
        OutputFormat::Human
    }
}

/// One JSON document per message; informational text is dropped
pub struct JsonFormatter;

impl JsonFormatter {
    fn render(level: Level, message: &str) -> Option<Value> {
        match level {
            Level::Success => Some(json!({"success": true, "message": message})),
            Level::Info => None,
            Level::Warn => Some(json!({"level": "warning", "message": message})),
            Level::Error => Some(json!({"success": false, "error": message})),
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn emit(&self, level: Level, message: &str) {
        let Some(value) = Self::render(level, message) else {
            return;
        };
        if level.to_stderr() {
            eprintln!("{value}");
        } else {
            println!("{value}");
        }
    }

    fn print_json(&self, value: &Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }

    fn format(&self) -> OutputFormat {
        OutputFormat::Json
    }
}

pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(HumanFormatter)
    }
}
