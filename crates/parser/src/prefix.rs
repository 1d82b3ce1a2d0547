//! §4.A Prefix grammar: the command header
//! `[user[:session]@host]<mode><assert> `.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{AssertMode, ExecutionMode};

static PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^
        (?:\[
            (?P<user>[a-z]+)?
            (?::(?P<session_name>[a-z0-9]+))?
            @
            (?P<host>[a-z]+)?
        \])?
        (?P<execution_mode>[\$%!])
        (?P<assert_mode>[=~_]?)
        \x20
        ",
    )
    .expect("prefix grammar is a valid regex")
});

/// A successfully parsed header: the glyphs plus where in `line` the
/// command text begins.
pub struct PrefixMatch {
    pub user: Option<String>,
    pub session_name: Option<String>,
    pub host: Option<String>,
    pub execution_mode: ExecutionMode,
    pub assert_mode: AssertMode,
    /// Byte offset of the first character after the matched header.
    pub command_start: usize,
}

/// Match the prefix grammar at the start of `line`. Returns `None` if the
/// line does not open with a valid header.
pub fn match_prefix(line: &str) -> Option<PrefixMatch> {
    let caps = PREFIX_RE.captures(line)?;

    let execution_mode = ExecutionMode::from_glyph(
        caps.name("execution_mode")?.as_str().chars().next()?,
    )?;

    let assert_mode = match caps.name("assert_mode").map(|m| m.as_str()) {
        Some("") | None => AssertMode::Literal,
        Some(glyph) => AssertMode::from_glyph(glyph.chars().next()?)?,
    };

    Some(PrefixMatch {
        user: caps.name("user").map(|m| m.as_str().to_string()),
        session_name: caps.name("session_name").map(|m| m.as_str().to_string()),
        host: caps.name("host").map(|m| m.as_str().to_string()),
        execution_mode,
        assert_mode,
        command_start: caps.get(0).unwrap().end(),
    })
}
