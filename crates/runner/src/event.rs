//! §6.5 event stream: `(kind, command?, payload_map)`.

use std::collections::HashMap;

use shellinspector_common::log_schema;
use shellinspector_parser::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CommandStarting,
    CommandPassed,
    CommandFailed,
    Error,
    RunSucceeded,
    RunFailed,
}

#[derive(Debug, Clone)]
pub enum PayloadValue {
    Int(i64),
    Text(String),
    Reasons(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub command: Option<Command>,
    pub payload: HashMap<String, PayloadValue>,
}

impl Event {
    pub fn command_starting(cmd: &Command) -> Self {
        Event {
            kind: EventKind::CommandStarting,
            command: Some(cmd.clone()),
            payload: HashMap::new(),
        }
    }

    pub fn command_passed(cmd: &Command, returncode: i64, actual: String) -> Self {
        let mut payload = HashMap::new();
        payload.insert(log_schema::RETURNCODE.to_string(), PayloadValue::Int(returncode));
        payload.insert("actual".to_string(), PayloadValue::Text(actual));
        Event {
            kind: EventKind::CommandPassed,
            command: Some(cmd.clone()),
            payload,
        }
    }

    pub fn command_failed(
        cmd: &Command,
        returncode: Option<i64>,
        actual: String,
        reasons: Vec<String>,
    ) -> Self {
        let mut payload = HashMap::new();
        if let Some(rc) = returncode {
            payload.insert(log_schema::RETURNCODE.to_string(), PayloadValue::Int(rc));
        }
        payload.insert("actual".to_string(), PayloadValue::Text(actual));
        payload.insert("reasons".to_string(), PayloadValue::Reasons(reasons));
        Event {
            kind: EventKind::CommandFailed,
            command: Some(cmd.clone()),
            payload,
        }
    }

    pub fn command_failed_with_message(cmd: &Command, message: String) -> Self {
        let mut payload = HashMap::new();
        payload.insert("message".to_string(), PayloadValue::Text(message));
        Event {
            kind: EventKind::CommandFailed,
            command: Some(cmd.clone()),
            payload,
        }
    }

    pub fn error(cmd: Option<&Command>, message: String, actual: Option<String>) -> Self {
        let mut payload = HashMap::new();
        payload.insert("message".to_string(), PayloadValue::Text(message));
        if let Some(actual) = actual {
            payload.insert("actual".to_string(), PayloadValue::Text(actual));
        }
        Event {
            kind: EventKind::Error,
            command: cmd.cloned(),
            payload,
        }
    }

    pub fn run_succeeded() -> Self {
        Event {
            kind: EventKind::RunSucceeded,
            command: None,
            payload: HashMap::new(),
        }
    }

    pub fn run_failed() -> Self {
        Event {
            kind: EventKind::RunFailed,
            command: None,
            payload: HashMap::new(),
        }
    }
}

/// §6.5: subscription point for the runner's structured event stream.
/// Reporters are invoked synchronously.
pub trait Reporter {
    fn on_event(&mut self, event: &Event);
}

/// A reporter that discards every event; useful as a default when no
/// console/log reporter is wired up.
pub struct NullReporter;

impl Reporter for NullReporter {
    fn on_event(&mut self, _event: &Event) {}
}
