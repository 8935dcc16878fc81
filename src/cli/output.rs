//! Output formatting for CLI commands.

use serde::Serialize;

use crate::cli::args::{LucernaArgs, OutputFormat};
use crate::error::Result;

/// Result of a query command.
#[derive(Debug, Serialize)]
pub struct QueryResults {
    pub index: String,
    pub ids: Vec<String>,
    pub duration_ms: u64,
}

/// Result of a write command.
#[derive(Debug, Serialize)]
pub struct WriteResult {
    pub index: String,
    pub ops: usize,
    pub committed: bool,
}

/// Result of a backup command.
#[derive(Debug, Serialize)]
pub struct BackupResult {
    pub files: Vec<String>,
    pub copied_to: Option<String>,
}

/// Print a command result in the selected format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &LucernaArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_human<T: Serialize>(message: &str, result: &T, args: &LucernaArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
    }
    let value = serde_json::to_value(result)?;
    for line in render_human(&value, 0) {
        println!("{line}");
    }
    Ok(())
}

fn output_json<T: Serialize>(result: &T, args: &LucernaArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}

/// Indented `key: value` lines for a JSON value.
fn render_human(value: &serde_json::Value, depth: usize) -> Vec<String> {
    let indent = "  ".repeat(depth);
    let mut lines = Vec::new();
    match value {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                if value.is_object() || value.is_array() {
                    lines.push(format!("{indent}{key}:"));
                    lines.extend(render_human(value, depth + 1));
                } else {
                    lines.push(format!("{indent}{key}: {}", scalar(value)));
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                if item.is_object() || item.is_array() {
                    lines.push(format!("{indent}-"));
                    lines.extend(render_human(item, depth + 1));
                } else {
                    lines.push(format!("{indent}- {}", scalar(item)));
                }
            }
        }
        other => lines.push(format!("{indent}{}", scalar(other))),
    }
    lines
}

fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
