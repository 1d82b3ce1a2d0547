//! §4.H Script-call interface: the contract between the runner and an
//! embedded script host.
//!
//! A `!` command's text is exactly one call-expression statement, e.g.
//! `create_user(name)`. The host loads the auxiliary file derived from
//! the spec path (`.ispec` -> `.ispec.py`), appends an implicit call that
//! injects a context object as the expression's first positional
//! argument, executes the file, and returns whatever that call produced.
//!
//! The host itself is Python, driven in-process via `pyo3` rather than
//! shelling out, so the script shares the runner's lifetime and can be
//! handed a live context object instead of a serialized one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pyo3::types::{PyAnyMethods, PyDict, PyDictMethods};
use pyo3::{PyErr, Python};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script expression must be exactly one statement: {0:?}")]
    OneStatementRequired(String),
    #[error("script expression must be a call expression: {0:?}")]
    CallExprRequired(String),
    #[error("script file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("failed to read script file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("script execution failed: {0}")]
    Python(String),
}

impl From<PyErr> for ScriptError {
    fn from(err: PyErr) -> Self {
        ScriptError::Python(err.to_string())
    }
}

/// Outcome of one `!` command, before the runner turns it into an Event.
pub enum ScriptOutcome {
    /// The call returned a truthy value. `env_diff` holds every key in
    /// the post-call environment whose value differs from (or is new
    /// relative to) the pre-call environment; the runner applies this
    /// diff to the session via `set_environment`.
    Passed { env_diff: HashMap<String, String> },
    /// The call returned something other than `True`; `message` is
    /// `str(return value)`.
    Failed { message: String },
}

/// Derive the auxiliary script path from a spec path: `foo.ispec` ->
/// `foo.ispec.py`, matching the convention named in §4.G.
pub fn script_path_for(spec_path: &Path) -> PathBuf {
    let mut name = spec_path.as_os_str().to_os_string();
    name.push(".py");
    PathBuf::from(name)
}

/// Run one script-call expression against the auxiliary file derived
/// from `spec_path`.
pub fn call(
    spec_path: &Path,
    expression: &str,
    applied_example: &HashMap<String, String>,
    env: &HashMap<String, String>,
) -> Result<ScriptOutcome, ScriptError> {
    let script_path = script_path_for(spec_path);
    if !script_path.is_file() {
        return Err(ScriptError::FileNotFound(script_path));
    }

    let source = std::fs::read_to_string(&script_path).map_err(|source| ScriptError::Io {
        path: script_path.clone(),
        source,
    })?;

    let rewritten = inject_context_argument(expression)?;

    Python::with_gil(|py| run_in_interpreter(py, &script_path, &source, &rewritten, applied_example, env))
}

/// Validate that `expression` is exactly one call-expression statement
/// and splice `__si_ctx__` in as its first positional argument.
fn inject_context_argument(expression: &str) -> Result<String, ScriptError> {
    let trimmed = expression.trim();

    let statements = split_top_level_statements(trimmed);
    if statements.len() != 1 {
        return Err(ScriptError::OneStatementRequired(trimmed.to_string()));
    }

    let open_paren = call_open_paren(statements[0])
        .ok_or_else(|| ScriptError::CallExprRequired(trimmed.to_string()))?;

    let head = &statements[0][..open_paren];
    let rest = &statements[0][open_paren + 1..];
    let has_args = !rest.trim_start().starts_with(')');

    let separator = if has_args { ", " } else { "" };
    Ok(format!("{head}(__si_ctx__{separator}{rest}"))
}

/// Split `src` on top-level `;` and newline separators, skipping
/// anything nested inside parens/brackets/braces or string literals.
/// Used only to count statements (§4.H's `ONE_STATEMENT_REQUIRED`).
fn split_top_level_statements(src: &str) -> Vec<&str> {
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut last_split = 0usize;
    let mut out = Vec::new();
    let bytes = src.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match in_string {
            Some(q) => {
                if c == '\\' {
                    i += 1;
                } else if c == q {
                    in_string = None;
                }
            }
            None => match c {
                '\'' | '"' => in_string = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                ';' | '\n' if depth == 0 => {
                    let piece = src[last_split..i].trim();
                    if !piece.is_empty() {
                        out.push(piece);
                    }
                    last_split = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }

    let tail = src[last_split..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }

    out
}

/// If `statement` is a bare call expression (`name(...)`,
/// `mod.attr(...)`), return the byte offset of its opening paren.
/// Anything that isn't an identifier chain immediately followed by a
/// parenthesized, balanced argument list spanning to the statement's end
/// fails (`CALL_EXPR_REQUIRED`).
fn call_open_paren(statement: &str) -> Option<usize> {
    let bytes = statement.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            i += 1;
        } else {
            break;
        }
    }

    if i == 0 || bytes.get(i) != Some(&b'(') {
        return None;
    }

    let open = i;
    let mut depth = 0i32;
    while i < bytes.len() {
        match bytes[i] as char {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return if i == bytes.len() - 1 { Some(open) } else { None };
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Preamble executed ahead of the script body: materializes `__si_ctx__`,
/// a plain object exposing `.applied_example` and a mutable `.env` that
/// aliases the dict we can read back afterward.
const CONTEXT_PREAMBLE: &str = "\
class _ShellinspectorContext:
    def __init__(self, applied_example, env):
        self.applied_example = applied_example
        self.env = env

__si_ctx__ = _ShellinspectorContext(__si_applied_example__, __si_env__)
";

fn run_in_interpreter(
    py: Python<'_>,
    script_path: &Path,
    source: &str,
    rewritten_call: &str,
    applied_example: &HashMap<String, String>,
    env: &HashMap<String, String>,
) -> Result<ScriptOutcome, ScriptError> {
    let globals = PyDict::new_bound(py);

    let applied_example_py = PyDict::new_bound(py);
    for (k, v) in applied_example {
        applied_example_py.set_item(k, v)?;
    }
    let env_py = PyDict::new_bound(py);
    for (k, v) in env {
        env_py.set_item(k, v)?;
    }
    globals.set_item("__si_applied_example__", &applied_example_py)?;
    globals.set_item("__si_env__", &env_py)?;

    let combined = format!("{CONTEXT_PREAMBLE}{source}\n__si_result__ = {rewritten_call}\n");

    py.run_bound(&combined, Some(&globals), None).map_err(|err| {
        ScriptError::Python(format!("{} ({})", err, script_path.display()))
    })?;

    let result = globals
        .get_item("__si_result__")?
        .ok_or_else(|| ScriptError::Python("script did not assign a result".to_string()))?;

    // `ctx.env` aliases `env_py`, so whatever the script mutated through
    // the context object is already reflected here.
    let mut new_env = HashMap::new();
    for (k, v) in env_py.iter() {
        new_env.insert(k.extract::<String>()?, v.extract::<String>()?);
    }

    let env_diff: HashMap<String, String> = new_env
        .into_iter()
        .filter(|(k, v)| env.get(k) != Some(v))
        .collect();

    if result.is_truthy()? {
        Ok(ScriptOutcome::Passed { env_diff })
    } else {
        let message = result.str()?.to_string();
        Ok(ScriptOutcome::Failed { message })
    }
}
