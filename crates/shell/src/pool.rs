//! §4.F Session pool: one live session per `SessionKey`, created lazily
//! and reused across commands.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use shellinspector_parser::Command;
use thiserror::Error;

use crate::session::{Session, SshTarget};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub session_name: Option<String>,
}

impl SessionKey {
    /// Derive the key `cmd` resolves to. Only `"local"` and `"remote"`
    /// are recognized hosts at runtime (§4.F); anything else is a fatal
    /// programming error.
    pub fn from_command(cmd: &Command, ssh_port: u16) -> Result<Self, PoolError> {
        match cmd.host.as_str() {
            "local" => Ok(SessionKey {
                host: "local".to_string(),
                port: 0,
                user: None,
                session_name: cmd.session_name.clone(),
            }),
            "remote" => Ok(SessionKey {
                host: "remote".to_string(),
                port: ssh_port,
                user: cmd.user.clone(),
                session_name: cmd.session_name.clone(),
            }),
            other => Err(PoolError::UnknownHost(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Unknown host: {0}")]
    UnknownHost(String),
    #[error(transparent)]
    Session(#[from] crate::session::SessionError),
}

/// Owns every live `Session`, keyed by `SessionKey`. Sessions are
/// mutated only through the pool.
pub struct SessionPool {
    ssh_target: Option<SshTarget>,
    sessions: HashMap<SessionKey, Session>,
}

impl SessionPool {
    pub fn new(ssh_target: Option<SshTarget>) -> Self {
        SessionPool {
            ssh_target,
            sessions: HashMap::new(),
        }
    }

    /// §4.F `get`: create a new session if the key is absent or closed,
    /// otherwise return the live one.
    pub fn get(&mut self, cmd: &Command, timeout_seconds: u64) -> Result<&mut Session, PoolError> {
        let port = self.ssh_target.as_ref().map(|t| t.port).unwrap_or(22);
        let key = SessionKey::from_command(cmd, port)?;
        let timeout = Duration::from_secs(timeout_seconds);

        let needs_fresh = match self.sessions.get(&key) {
            Some(session) => session.is_closed(),
            None => true,
        };

        if needs_fresh {
            let session = match key.host.as_str() {
                "local" => Session::spawn_local(timeout)?,
                "remote" => {
                    let target = self
                        .ssh_target
                        .as_ref()
                        .ok_or_else(|| PoolError::UnknownHost("remote".to_string()))?;
                    Session::spawn_ssh(target, timeout)?
                }
                other => return Err(PoolError::UnknownHost(other.to_string())),
            };
            self.sessions.insert(key.clone(), session);
        }

        Ok(self.sessions.get_mut(&key).expect("just inserted"))
    }

    /// Look up the live session for `key` without touching the pool's
    /// get-or-create logic. Used by callers (the runner) that already
    /// resolved the key via a prior `get`.
    pub fn session_mut(&mut self, key: &SessionKey) -> Option<&mut Session> {
        self.sessions.get_mut(key)
    }

    /// §4.F `close`: close and remove the session `cmd` resolves to.
    pub fn close(&mut self, cmd: &Command) -> Result<(), PoolError> {
        let port = self.ssh_target.as_ref().map(|t| t.port).unwrap_or(22);
        let key = SessionKey::from_command(cmd, port)?;
        if let Some(mut session) = self.sessions.remove(&key) {
            session.close();
        }
        Ok(())
    }

    /// §4.G step 4: pop every session in `keys` back to its pre-spec
    /// push depth, without closing it — the pool keeps owning it for
    /// the remainder of the process. Best-effort: a session that
    /// refuses to pop (early exit) is left as-is and its error logged
    /// by the caller, since this runs during cleanup after pass/fail has
    /// already been decided.
    pub fn pop_used(&mut self, keys: &HashSet<SessionKey>) -> Vec<(SessionKey, crate::session::SessionError)> {
        let mut errors = Vec::new();
        for key in keys {
            if let Some(session) = self.sessions.get_mut(key) {
                if !session.is_closed() {
                    if let Err(err) = session.pop_state() {
                        errors.push((key.clone(), err));
                    }
                }
            }
        }
        errors
    }

    /// Pop every live session back to its pre-push state, then close
    /// it, so tearing down the pool never leaves an outer shell (if
    /// any) surprised by a leftover nested shell.
    pub fn teardown(&mut self) {
        for session in self.sessions.values_mut() {
            while session.push_depth() > 0 && !session.is_closed() {
                if session.pop_state().is_err() {
                    break;
                }
            }
            session.close();
        }
        self.sessions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
