//! Shell quoting for `set_environment` and parsing for `get_environment`
//! (§4.E).

/// Shell-quote a value for safe use on the right-hand side of an
/// `export KEY=<value>` line.
pub fn quote(value: &str) -> String {
    shell_words::quote(value).into_owned()
}

/// Parse one line of `export` builtin output (`declare -x KEY=value` or
/// `KEY=value` form) into a `(key, value)` pair. Lines without a value
/// (bare `declare -x KEY`) are dropped, per §4.E.
pub fn parse_export_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    let rest = line
        .strip_prefix("declare -x ")
        .or_else(|| line.strip_prefix("export "))
        .unwrap_or(line);

    let tokens = shell_words::split(rest).ok()?;
    let joined = tokens.join(" ");
    let (key, value) = joined.split_once('=')?;

    if key.is_empty() || value.is_empty() {
        return None;
    }

    Some((key.to_string(), value.to_string()))
}
