//! Interactive shell sessions (§4.E) and the session pool that owns
//! them (§4.F).

mod color;
mod marker;
mod pool;
mod quoting;
mod session;

pub use color::{disable_color, DisableColorGuard};
pub use pool::{PoolError, SessionKey, SessionPool};
pub use session::{Session, SessionError, SshTarget};
