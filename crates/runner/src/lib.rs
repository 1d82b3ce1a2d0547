//! §4.G–§4.H: orchestrates a parsed [`shellinspector_parser::Specfile`]
//! against the session pool, evaluates the assertion policy, and emits
//! the structured event stream a Reporter consumes.

mod event;
mod runner;
mod script;

pub use event::{Event, EventKind, NullReporter, PayloadValue, Reporter};
pub use runner::Runner;
pub use script::{call as call_script, script_path_for, ScriptError, ScriptOutcome};
