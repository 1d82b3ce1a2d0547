//! §4.E Shell session: a local PTY subshell or an SSH connection driven
//! through the same marker-synchronized read/write loop.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use shellinspector_common::redact_sensitive;
use thiserror::Error;

use crate::color::disable_color;
use crate::marker;
use crate::quoting;

const DEFAULT_SHELL: &str = "/bin/bash";
const PTY_SIZE: PtySize = PtySize {
    rows: 50,
    cols: 200,
    pixel_width: 0,
    pixel_height: 0,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timed out waiting for prompt; partial output: {partial:?}")]
    Timeout { partial: String },
    #[error("session is closed")]
    Closed,
    #[error("test shell was exited early: expected push depth {expected}, observed {observed}")]
    EarlyExit { expected: u32, observed: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Pty(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Connection details for reaching a remote host over SSH.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub key_path: Option<PathBuf>,
}

/// A live interactive shell: local PTY subshell or SSH, synchronized on
/// a unique prompt marker.
pub struct Session {
    marker: String,
    writer: Box<dyn Write + Send>,
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
    child: Box<dyn Child + Send + Sync>,
    #[allow(dead_code)]
    master: Box<dyn MasterPty + Send>,
    timeout: Duration,
    push_depth: u32,
    closed: bool,
}

impl Session {
    /// §4.E `login`: spawn a local subshell, disable color for the
    /// duration of login, configure the unique prompt, and synchronize
    /// on its first appearance.
    pub fn spawn_local(timeout: Duration) -> Result<Self> {
        tracing::debug!(host = "local", "spawning session");
        let _guard = disable_color();
        let mut cmd = CommandBuilder::new(DEFAULT_SHELL);
        cmd.env("TERM", "dumb");
        cmd.arg("--noprofile");
        cmd.arg("--norc");
        Self::spawn(cmd, timeout)
    }

    /// §4.E `login`: establish SSH with the provided target.
    pub fn spawn_ssh(target: &SshTarget, timeout: Duration) -> Result<Self> {
        tracing::debug!(
            host = %target.server,
            port = target.port,
            user = %target.username,
            "spawning session"
        );
        let _guard = disable_color();
        let mut cmd = CommandBuilder::new("ssh");
        cmd.env("TERM", "dumb");
        cmd.arg("-tt");
        cmd.arg("-p");
        cmd.arg(target.port.to_string());
        cmd.arg("-o");
        cmd.arg("StrictHostKeyChecking=accept-new");
        if let Some(key) = &target.key_path {
            cmd.arg("-i");
            cmd.arg(key);
        }
        cmd.arg(format!("{}@{}", target.username, target.server));
        Self::spawn(cmd, timeout)
    }

    fn spawn(cmd: CommandBuilder, timeout: Duration) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PTY_SIZE)
            .map_err(|e| anyhow::anyhow!("failed to open PTY: {e}"))?;

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| anyhow::anyhow!("failed to spawn shell: {e}"))?;
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| anyhow::anyhow!("failed to open PTY writer: {e}"))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| anyhow::anyhow!("failed to open PTY reader: {e}"))?;

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let marker = marker::generate();
        let mut session = Session {
            marker: marker.clone(),
            writer,
            rx,
            pending: Vec::new(),
            child,
            master: pair.master,
            timeout,
            push_depth: 0,
            closed: false,
        };

        session.configure_prompt(&marker)?;
        Ok(session)
    }

    fn configure_prompt(&mut self, marker: &str) -> Result<()> {
        self.send_line(&format!("unset PROMPT_COMMAND; PS1=$'\\n{marker}\\n'"))?;
        let (found, _) = self.wait_for_prompt(self.timeout)?;
        if !found {
            self.closed = true;
            return Err(SessionError::Timeout {
                partial: String::new(),
            });
        }
        Ok(())
    }

    /// §4.E `send_line`: write a command followed by a newline.
    pub fn send_line(&mut self, text: &str) -> Result<()> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.writer.write_all(text.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// §4.E `wait_for_prompt`: block up to `timeout` for the marker.
    /// Returns the output observed before the marker.
    pub fn wait_for_prompt(&mut self, timeout: Duration) -> Result<(bool, Vec<u8>)> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(range) = marker::find(&self.pending, &self.marker) {
                let before = self.pending[..range.start].to_vec();
                self.pending.drain(..range.end);
                return Ok((true, before));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok((false, self.pending.clone()));
            }

            match self.rx.recv_timeout(remaining) {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(mpsc::RecvTimeoutError::Timeout) => return Ok((false, self.pending.clone())),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Ok((false, self.pending.clone()))
                }
            }
        }
    }

    /// §4.E `run_command`: send, wait, normalize `\r\n` to `\n`. On
    /// timeout the session is closed.
    pub fn run_command(&mut self, text: &str) -> Result<String> {
        let started = Instant::now();
        self.send_line(text)?;
        let (found, output) = self.wait_for_prompt(self.timeout)?;
        let normalized = String::from_utf8_lossy(&output).replace("\r\n", "\n");

        if !found {
            self.closed = true;
            tracing::debug!(
                command = %text,
                duration_ms = started.elapsed().as_millis() as u64,
                "command timed out"
            );
            return Err(SessionError::Timeout { partial: normalized });
        }

        tracing::trace!(
            command = %text,
            duration_ms = started.elapsed().as_millis() as u64,
            "command completed"
        );
        Ok(normalized)
    }

    /// §4.E `set_environment`.
    pub fn set_environment(&mut self, env: &HashMap<String, String>) -> Result<()> {
        let mut keys: Vec<&String> = env.keys().collect();
        keys.sort();
        for key in keys {
            let value = &env[key];
            tracing::trace!(key = %key, value = %redact_sensitive(key, value), "exporting session variable");
            self.run_command(&format!("export {key}={}", quoting::quote(value)))?;
        }
        Ok(())
    }

    /// §4.E `get_environment`.
    pub fn get_environment(&mut self) -> Result<HashMap<String, String>> {
        let output = self.run_command("export")?;
        Ok(output
            .lines()
            .filter_map(quoting::parse_export_line)
            .collect())
    }

    /// §4.E `push_state`: launch a nested shell, reconfigure the
    /// prompt, and export the depth marker.
    pub fn push_state(&mut self) -> Result<()> {
        self.push_depth += 1;
        self.send_line(&format!("{DEFAULT_SHELL} --noprofile --norc"))?;
        let marker = self.marker.clone();
        self.configure_prompt(&marker)?;
        let mut env = HashMap::new();
        env.insert(
            "SHELLINSPECTOR_PROMPT_STATE".to_string(),
            self.push_depth.to_string(),
        );
        self.set_environment(&env)
    }

    /// §4.E `pop_state`: verify the marker variable still matches the
    /// expected depth, then exit the nested shell.
    pub fn pop_state(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let observed = self
            .run_command("echo $SHELLINSPECTOR_PROMPT_STATE")?
            .trim()
            .to_string();
        let expected = self.push_depth.to_string();
        if observed != expected {
            return Err(SessionError::EarlyExit {
                expected: self.push_depth,
                observed,
            });
        }

        self.send_line("exit")?;
        let (found, _) = self.wait_for_prompt(self.timeout)?;
        if !found {
            self.closed = true;
        }
        self.push_depth -= 1;
        Ok(())
    }

    pub fn push_depth(&self) -> u32 {
        self.push_depth
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// §4.E `close`. On unix, signal the child's process group with
    /// `SIGHUP` before falling back to `portable_pty`'s `kill()` — a
    /// nested `bash` started by `push_state` otherwise ignores a plain
    /// `kill()` of the outer shell and lingers as an orphan.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        tracing::debug!(marker = %self.marker, "closing session");
        #[cfg(unix)]
        if let Some(pid) = self.child.process_id() {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGHUP);
            }
        }
        let _ = self.child.kill();
        self.closed = true;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_session() -> Session {
        Session::spawn_local(Duration::from_secs(5)).expect("spawn local bash session")
    }

    #[test]
    fn runs_a_command_and_captures_output() {
        let mut session = local_session();
        let out = session.run_command("echo hello").unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn set_and_get_environment_round_trips() {
        let mut session = local_session();
        let mut env = HashMap::new();
        env.insert("SI_TEST_VAR".to_string(), "has space".to_string());
        session.set_environment(&env).unwrap();

        let observed = session.get_environment().unwrap();
        assert_eq!(observed.get("SI_TEST_VAR").unwrap(), "has space");
    }

    #[test]
    fn push_then_pop_state_round_trips_depth() {
        let mut session = local_session();
        session.push_state().unwrap();
        assert_eq!(session.push_depth(), 1);
        session.pop_state().unwrap();
        assert_eq!(session.push_depth(), 0);
    }

    #[test]
    fn pop_state_detects_early_exit() {
        let mut session = local_session();
        session.push_state().unwrap();
        // Simulate the user exiting the nested shell themselves.
        session.send_line("exit").unwrap();
        session.wait_for_prompt(session.timeout).unwrap();
        let err = session.pop_state().unwrap_err();
        assert!(matches!(err, SessionError::EarlyExit { .. }));
    }

    #[test]
    fn timeout_closes_the_session() {
        let mut session = Session::spawn_local(Duration::from_millis(200)).unwrap();
        let err = session.run_command("sleep 5").unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }));
        assert!(session.is_closed());
    }
}
