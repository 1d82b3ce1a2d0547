//! §5: "one per-process mutable map of environment variables is
//! temporarily mutated by `disable_color`". Forces `TERM=dumb` for the
//! duration of login so the remote/local shell doesn't decorate its
//! prompt with color escapes that would corrupt marker matching.

use std::env;

pub struct DisableColorGuard {
    previous: Option<String>,
}

/// Set `TERM=dumb` and return a guard that restores the previous value
/// (or unsets it) when dropped.
pub fn disable_color() -> DisableColorGuard {
    let previous = env::var("TERM").ok();
    env::set_var("TERM", "dumb");
    DisableColorGuard { previous }
}

impl Drop for DisableColorGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(value) => env::set_var("TERM", value),
            None => env::remove_var("TERM"),
        }
    }
}
