//! Console reporter: out of scope per spec.md §1 ("the human-readable
//! console reporter ... the core exposes a structured event stream;
//! reporters consume it"), but a CLI needs *some* implementation to be
//! useful, grounded on the original `reporter.py`'s prefix/color
//! convention.

use colored::Colorize;
use shellinspector_common::log_schema;
use shellinspector_runner::{Event, EventKind, PayloadValue, Reporter};

pub struct ConsoleReporter {
    passed: usize,
    failed: usize,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        ConsoleReporter {
            passed: 0,
            failed: 0,
        }
    }

    pub fn summary(&self) -> (usize, usize) {
        (self.passed, self.failed)
    }

    fn text(payload: &Event, key: &str) -> Option<String> {
        match payload.payload.get(key) {
            Some(PayloadValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn print_with_prefix(prefix: &str, text: &str, color: &str) {
        println!("{}", prefix.dimmed());
        for line in text.lines() {
            let rendered = format!("   {}", line.trim_end());
            println!("{}", colorize(&rendered, color));
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn colorize(text: &str, color: &str) -> colored::ColoredString {
    match color {
        "green" => text.green(),
        "red" => text.red(),
        "white" => text.white(),
        _ => text.normal(),
    }
}

impl Reporter for ConsoleReporter {
    fn on_event(&mut self, event: &Event) {
        match event.kind {
            EventKind::CommandStarting => {
                if let Some(cmd) = &event.command {
                    print!("{} ", "RUN ".dimmed());
                    print!("{}", cmd.line);
                    use std::io::Write;
                    let _ = std::io::stdout().flush();
                }
            }
            EventKind::CommandPassed => {
                reset_line();
                if let Some(cmd) = &event.command {
                    println!("{} {}", "PASS".green().bold(), cmd.line);
                }
                self.passed += 1;
            }
            EventKind::CommandFailed => {
                reset_line();
                if let Some(cmd) = &event.command {
                    println!("{} {}", "FAIL".red().bold(), cmd.line);
                }
                if let Some(message) = Self::text(event, "message") {
                    println!("{}", message.red());
                }
                if let Some(reasons) = event.payload.get("reasons") {
                    if let PayloadValue::Reasons(reasons) = reasons {
                        if reasons.iter().any(|r| r == log_schema::RETURNCODE) {
                            println!("{}", "command exited non-zero".red());
                        }
                        if reasons.iter().any(|r| r == "output") {
                            if let Some(cmd) = &event.command {
                                Self::print_with_prefix("expected:", &cmd.expected, "white");
                            }
                            if let Some(actual) = Self::text(event, "actual") {
                                Self::print_with_prefix("actual:", &actual, "white");
                            }
                        }
                    }
                }
                self.failed += 1;
            }
            EventKind::Error => {
                reset_line();
                if let Some(message) = Self::text(event, "message") {
                    println!("{} {}", "ERROR".red().bold(), message.red());
                }
                if let Some(actual) = Self::text(event, "actual") {
                    Self::print_with_prefix("output before giving up:", &actual, "red");
                }
            }
            EventKind::RunSucceeded | EventKind::RunFailed => {}
        }
    }
}

/// Matches the original `reset_line()`: clear the in-progress "RUN ..."
/// line before printing the PASS/FAIL verdict over it.
fn reset_line() {
    print!("\x1b[2K\x1b[1G");
}
