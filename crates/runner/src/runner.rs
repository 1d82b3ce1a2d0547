//! §4.G Runner: orchestrates a parsed `Specfile` against the session
//! pool and emits the structured event stream consumed by a Reporter.

use std::collections::{HashMap, HashSet};

use regex::RegexBuilder;
use shellinspector_common::log_schema;
use shellinspector_parser::{AssertMode, Command, ExecutionMode, Specfile};
use shellinspector_shell::{SessionError, SessionKey, SessionPool, SshTarget};

use crate::event::{Event, Reporter};
use crate::script;

/// Internal classification of what happened when a command was driven
/// against its session; turned into Events by `run_inner`.
enum CommandOutcome {
    Passed {
        returncode: i64,
        actual: String,
    },
    Failed {
        returncode: Option<i64>,
        actual: String,
        reasons: Vec<String>,
    },
    ScriptFailed {
        message: String,
    },
    /// `logout`: the session was closed; nothing to assert.
    LoggedOut,
    /// Prompt timeout or a programming/pool error (§7): aborts the run.
    Error {
        message: String,
        actual: Option<String>,
    },
}

/// §4.G `Runner(ssh_config, context)`.
pub struct Runner {
    pool: SessionPool,
    ssh_port: u16,
    context: HashMap<String, String>,
    reporter: Box<dyn Reporter>,
    /// Best-effort cache of each session's last-known exported
    /// environment, used only to render `${NAME}` in `Command.line` for
    /// reporting (§6.4) without round-tripping to the shell on every
    /// command.
    known_env: HashMap<SessionKey, HashMap<String, String>>,
}

impl Runner {
    pub fn new(
        ssh_target: Option<SshTarget>,
        context: HashMap<String, String>,
        reporter: Box<dyn Reporter>,
    ) -> Self {
        let ssh_port = ssh_target.as_ref().map(|t| t.port).unwrap_or(22);
        Runner {
            pool: SessionPool::new(ssh_target),
            ssh_port,
            context,
            reporter,
            known_env: HashMap::new(),
        }
    }

    /// §4.G context defaults: `SI_TARGET`, `SI_TARGET_SSH_USERNAME`,
    /// `SI_TARGET_SSH_PORT`, exposed to every session.
    pub fn context_from_ssh_target(target: Option<&SshTarget>) -> HashMap<String, String> {
        let mut context = HashMap::new();
        if let Some(target) = target {
            context.insert("SI_TARGET".to_string(), target.server.clone());
            context.insert(
                "SI_TARGET_SSH_USERNAME".to_string(),
                target.username.clone(),
            );
            context.insert("SI_TARGET_SSH_PORT".to_string(), target.port.to_string());
        }
        context
    }

    /// Entry point: run `specfile` top-level. Returns the pass/fail
    /// verdict; the pool's live sessions are left open for any
    /// subsequent top-level `run` in the same process.
    pub fn run(&mut self, specfile: &Specfile) -> bool {
        let mut used_sessions = HashSet::new();
        self.run_inner(specfile, &mut used_sessions, true)
    }

    /// Reentrant per §4.G: the same logic drives both top-level runs and
    /// nested fixture invocations, sharing `used_sessions` across the
    /// whole family so a fixture and its test share sessions and
    /// environment.
    fn run_inner(
        &mut self,
        specfile: &Specfile,
        used_sessions: &mut HashSet<SessionKey>,
        outermost: bool,
    ) -> bool {
        if let Some(pre) = &specfile.fixture_specfile_pre {
            if !self.run_inner(pre, used_sessions, false) {
                if outermost {
                    self.cleanup(used_sessions);
                }
                return false;
            }
        }

        for cmd in &specfile.commands {
            let key = SessionKey::from_command(cmd, self.ssh_port).ok();
            self.emit(self.starting_event(cmd, key.as_ref()));

            match self.execute(cmd, specfile, used_sessions) {
                CommandOutcome::Passed { returncode, actual } => {
                    self.emit(Event::command_passed(cmd, returncode, actual));
                }
                CommandOutcome::LoggedOut => {
                    self.emit(Event::command_passed(cmd, 0, String::new()));
                }
                CommandOutcome::Failed {
                    returncode,
                    actual,
                    reasons,
                } => {
                    self.emit(Event::command_failed(cmd, returncode, actual, reasons));
                    return self.fail_run(specfile, used_sessions, outermost);
                }
                CommandOutcome::ScriptFailed { message } => {
                    self.emit(Event::command_failed_with_message(cmd, message));
                    return self.fail_run(specfile, used_sessions, outermost);
                }
                CommandOutcome::Error { message, actual } => {
                    self.emit(Event::error(Some(cmd), message, actual));
                    return self.fail_run(specfile, used_sessions, outermost);
                }
            }
        }

        if let Some(post) = &specfile.fixture_specfile_post {
            if !self.run_inner(post, used_sessions, false) {
                if outermost {
                    self.cleanup(used_sessions);
                }
                return false;
            }
        }

        if outermost {
            self.cleanup(used_sessions);
        }

        self.emit(Event::run_succeeded());
        true
    }

    /// Shared tail of every failure path (§4.G.2/§7): emit `RUN_FAILED`,
    /// still give the post-fixture a chance to clean up, then — if this
    /// is the outermost invocation — pop every touched session back to
    /// its pre-spec depth.
    fn fail_run(
        &mut self,
        specfile: &Specfile,
        used_sessions: &mut HashSet<SessionKey>,
        outermost: bool,
    ) -> bool {
        self.emit(Event::run_failed());
        if let Some(post) = &specfile.fixture_specfile_post {
            self.run_inner(post, used_sessions, false);
        }
        if outermost {
            self.cleanup(used_sessions);
        }
        false
    }

    fn cleanup(&mut self, used_sessions: &HashSet<SessionKey>) {
        for (key, err) in self.pool.pop_used(used_sessions) {
            tracing::warn!(session = ?key, error = %err, "failed to pop session state during cleanup");
        }
    }

    fn execute(
        &mut self,
        cmd: &Command,
        specfile: &Specfile,
        used_sessions: &mut HashSet<SessionKey>,
    ) -> CommandOutcome {
        let key = match SessionKey::from_command(cmd, self.ssh_port) {
            Ok(key) => key,
            Err(err) => return error_outcome(err),
        };

        if let Err(err) = self.pool.get(cmd, specfile.settings.timeout_seconds) {
            return error_outcome(err);
        }

        match cmd.execution_mode {
            ExecutionMode::Script => self.execute_script(cmd, specfile, &key),
            _ if cmd.command.trim() == "logout" => self.execute_logout(cmd, used_sessions),
            _ => self.execute_normal(cmd, specfile, &key, used_sessions),
        }
    }

    /// §4.H script command: snapshot the session's environment, hand it
    /// to the script host alongside the applied example, and apply the
    /// returned diff back to the session on success.
    fn execute_script(
        &mut self,
        cmd: &Command,
        specfile: &Specfile,
        key: &SessionKey,
    ) -> CommandOutcome {
        let applied_example = specfile.applied_example.clone().unwrap_or_default();

        let env_snapshot = {
            let session = self.pool.session_mut(key).expect("just acquired by execute()");
            match session.get_environment() {
                Ok(env) => env,
                Err(err) => return error_outcome(err),
            }
        };
        self.known_env.insert(key.clone(), env_snapshot.clone());

        match script::call(&specfile.path, &cmd.command, &applied_example, &env_snapshot) {
            Ok(script::ScriptOutcome::Passed { env_diff }) => {
                if !env_diff.is_empty() {
                    let session =
                        self.pool.session_mut(key).expect("just acquired by execute()");
                    if let Err(err) = session.set_environment(&env_diff) {
                        return error_outcome(err);
                    }
                    self.known_env
                        .entry(key.clone())
                        .or_default()
                        .extend(env_diff);
                }
                CommandOutcome::Passed {
                    returncode: 0,
                    actual: String::new(),
                }
            }
            Ok(script::ScriptOutcome::Failed { message }) => {
                CommandOutcome::ScriptFailed { message }
            }
            Err(err) => CommandOutcome::ScriptFailed {
                message: err.to_string(),
            },
        }
    }

    /// Literal `logout`: close the session and drop it from
    /// `used_sessions` so a later command against the same key gets a
    /// freshly created one.
    fn execute_logout(
        &mut self,
        cmd: &Command,
        used_sessions: &mut HashSet<SessionKey>,
    ) -> CommandOutcome {
        match self.pool.close(cmd) {
            Ok(()) => {
                if let Ok(key) = SessionKey::from_command(cmd, self.ssh_port) {
                    used_sessions.remove(&key);
                    self.known_env.remove(&key);
                }
                CommandOutcome::LoggedOut
            }
            Err(err) => error_outcome(err),
        }
    }

    /// A normal `$`/`%` command: first touch of a session in this spec
    /// applies `specfile.environment` then the process-scoped `context`,
    /// then pushes a nested shell (§4.G "this guarantees that every
    /// freshly-touched session begins inside a clean nested shell scoped
    /// to this spec file"). Then run the command and fetch its exit
    /// status.
    fn execute_normal(
        &mut self,
        cmd: &Command,
        specfile: &Specfile,
        key: &SessionKey,
        used_sessions: &mut HashSet<SessionKey>,
    ) -> CommandOutcome {
        if !used_sessions.contains(key) {
            let session = self.pool.session_mut(key).expect("just acquired by execute()");

            if let Err(err) = session.set_environment(&specfile.environment) {
                return error_outcome(err);
            }
            if let Err(err) = session.set_environment(&self.context) {
                return error_outcome(err);
            }
            if let Err(err) = session.push_state() {
                return error_outcome(err);
            }

            used_sessions.insert(key.clone());
            let entry = self.known_env.entry(key.clone()).or_default();
            entry.extend(specfile.environment.clone());
            entry.extend(self.context.clone());
        }

        let session = self.pool.session_mut(key).expect("just acquired by execute()");

        let actual = match session.run_command(&cmd.command) {
            Ok(output) => output,
            Err(SessionError::Timeout { partial }) => {
                return CommandOutcome::Error {
                    message: "timed out waiting for prompt".to_string(),
                    actual: Some(partial),
                };
            }
            Err(err) => return error_outcome(err),
        };

        let returncode_output = match session.run_command("echo $?") {
            Ok(output) => output,
            Err(SessionError::Timeout { partial }) => {
                return CommandOutcome::Error {
                    message: "timed out waiting for prompt after `echo $?`".to_string(),
                    actual: Some(partial),
                };
            }
            Err(err) => return error_outcome(err),
        };

        let returncode: i64 = match returncode_output.trim().parse() {
            Ok(code) => code,
            Err(_) => {
                return CommandOutcome::Error {
                    message: format!(
                        "could not parse return code from {returncode_output:?}"
                    ),
                    actual: Some(actual),
                };
            }
        };

        let output_matches = assertion_matches(cmd, &actual);
        let mut reasons = Vec::new();
        if !output_matches {
            reasons.push("output".to_string());
        }
        if returncode != 0 {
            reasons.push(log_schema::RETURNCODE.to_string());
        }

        if output_matches && returncode == 0 {
            CommandOutcome::Passed { returncode, actual }
        } else {
            CommandOutcome::Failed {
                returncode: Some(returncode),
                actual,
                reasons,
            }
        }
    }

    /// Build the `COMMAND_STARTING` event, with `cmd.line`'s `${NAME}`
    /// tokens interpolated against the session's last-known environment
    /// (§6.4). A command whose session has no cached environment yet
    /// (never touched) reports its line verbatim.
    fn starting_event(&self, cmd: &Command, key: Option<&SessionKey>) -> Event {
        let env = key.and_then(|key| self.known_env.get(key));
        match env {
            Some(env) => {
                let mut display = cmd.clone();
                display.line =
                    shellinspector_common::expand_vars(&cmd.line, |name| env.get(name).cloned());
                Event::command_starting(&display)
            }
            None => Event::command_starting(cmd),
        }
    }

    fn emit(&mut self, event: Event) {
        self.reporter.on_event(&event);
    }
}

fn error_outcome(err: impl std::fmt::Display) -> CommandOutcome {
    CommandOutcome::Error {
        message: err.to_string(),
        actual: None,
    }
}

/// §4.G.1 assertion policy. Both LITERAL and REGEX compare against a
/// trimmed `actual`: the session's captured output still carries the
/// shell's own line discipline around it, and only the command's own
/// output — not surrounding whitespace — is semantically meaningful.
fn assertion_matches(cmd: &Command, actual: &str) -> bool {
    let actual = actual.trim();
    match cmd.assert_mode {
        AssertMode::Literal => actual == cmd.expected.trim(),
        AssertMode::Regex => RegexBuilder::new(&cmd.expected)
            .multi_line(true)
            .build()
            .map(|re| re.is_match(actual))
            .unwrap_or(false),
        AssertMode::Ignore => true,
    }
}
