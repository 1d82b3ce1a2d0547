//! Data model for a parsed spec file (§3 of the design).

use std::collections::HashMap;
use std::path::PathBuf;

/// How a command is executed: as the given/inherited user, forced as
/// `root`, or handed to the embedded script host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    User,
    Root,
    Script,
}

impl ExecutionMode {
    pub fn glyph(self) -> char {
        match self {
            ExecutionMode::User => '$',
            ExecutionMode::Root => '%',
            ExecutionMode::Script => '!',
        }
    }

    pub fn from_glyph(glyph: char) -> Option<Self> {
        match glyph {
            '$' => Some(ExecutionMode::User),
            '%' => Some(ExecutionMode::Root),
            '!' => Some(ExecutionMode::Script),
            _ => None,
        }
    }
}

/// How a command's recorded output is compared against what the shell
/// actually produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssertMode {
    Literal,
    Regex,
    Ignore,
}

impl AssertMode {
    pub fn glyph(self) -> Option<char> {
        match self {
            AssertMode::Literal => None,
            AssertMode::Regex => Some('~'),
            AssertMode::Ignore => Some('_'),
        }
    }

    pub fn from_glyph(glyph: char) -> Option<Self> {
        match glyph {
            '=' => Some(AssertMode::Literal),
            '~' => Some(AssertMode::Regex),
            '_' => Some(AssertMode::Ignore),
            _ => None,
        }
    }
}

impl Default for AssertMode {
    fn default() -> Self {
        AssertMode::Literal
    }
}

/// One row of a spec file: a command header plus the accumulated expected
/// output that follows it.
#[derive(Debug, Clone)]
pub struct Command {
    pub execution_mode: ExecutionMode,
    pub assert_mode: AssertMode,
    /// Text after the header; may span multiple lines while a
    /// here-document is being absorbed.
    pub command: String,
    pub user: Option<String>,
    pub host: String,
    pub session_name: Option<String>,
    pub expected: String,
    pub source_file: PathBuf,
    pub source_line_no: usize,
    /// The original header line, kept for diagnostics and `${NAME}`
    /// interpolation at report time.
    pub line: String,
    /// True while still absorbing here-document lines (`<<HERE` ... `HERE`).
    pub has_heredoc: bool,
}

impl Command {
    /// Number of lines `expected` represents, counting a final partial
    /// line without a trailing newline.
    pub fn line_count(&self) -> usize {
        let mut count = self.expected.matches('\n').count();
        if !self.expected.is_empty() && !self.expected.ends_with('\n') {
            count += 1;
        }
        count
    }

    /// One-line summary used by diagnostics and reporters.
    pub fn short(&self) -> String {
        format!(
            "{:?}({}@{}) `{}` (expect {} lines, {:?})",
            self.execution_mode,
            self.user.as_deref().unwrap_or(""),
            self.host,
            self.command,
            self.line_count(),
            self.assert_mode,
        )
    }

    /// Whether the here-document this command opened has reached its
    /// terminating `HERE` line.
    pub fn heredoc_closed(&self) -> bool {
        self.command
            .lines()
            .next_back()
            .map(|l| l == "HERE")
            .unwrap_or(false)
    }
}

/// A non-fatal parse error, accumulated on the `Specfile` rather than
/// aborting the parse.
#[derive(Debug, Clone)]
pub struct Error {
    pub source_file: PathBuf,
    pub source_line_no: usize,
    pub source_line: String,
    pub message: String,
}

/// Which fixture lifetime a fixture pair is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureScope {
    /// Run around every spec file individually (including each example
    /// instance). Default.
    File,
    /// Run at most once per process invocation, deduplicated by the
    /// driver on the fixture's path.
    Run,
}

impl Default for FixtureScope {
    fn default() -> Self {
        FixtureScope::File
    }
}

/// Merged per-file settings: `settings.timeout_seconds`, `include_dirs`,
/// `fixture_dirs`. Both directory lists always contain at least the
/// spec's own directory as a final fallback.
#[derive(Debug, Clone)]
pub struct Settings {
    pub timeout_seconds: u64,
    pub include_dirs: Vec<PathBuf>,
    pub fixture_dirs: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            timeout_seconds: 5,
            include_dirs: Vec::new(),
            fixture_dirs: Vec::new(),
        }
    }
}

/// A fully parsed spec file.
#[derive(Debug, Clone)]
pub struct Specfile {
    pub path: PathBuf,
    pub commands: Vec<Command>,
    pub errors: Vec<Error>,
    pub environment: HashMap<String, String>,
    pub examples: Vec<HashMap<String, String>>,
    pub fixture: Option<String>,
    pub fixture_scope: FixtureScope,
    pub fixture_specfile_pre: Option<Box<Specfile>>,
    pub fixture_specfile_post: Option<Box<Specfile>>,
    pub applied_example: Option<HashMap<String, String>>,
    pub tags: Vec<String>,
    pub settings: Settings,
    pub is_fixture: bool,
}

impl Specfile {
    pub fn new(path: PathBuf) -> Self {
        Specfile {
            path,
            commands: Vec::new(),
            errors: Vec::new(),
            environment: HashMap::new(),
            examples: Vec::new(),
            fixture: None,
            fixture_scope: FixtureScope::default(),
            fixture_specfile_pre: None,
            fixture_specfile_post: None,
            applied_example: None,
            tags: Vec::new(),
            settings: Settings::default(),
            is_fixture: false,
        }
    }

    /// A Specfile is eligible for execution only when parsing produced no
    /// errors (§7 driver policy).
    pub fn is_runnable(&self) -> bool {
        self.errors.is_empty()
    }

    /// Produce an independent deep copy with `applied_example` set and
    /// every command's `command`/`line`/`expected` interpolated against
    /// `example`. The original is never mutated.
    pub fn as_example(&self, example: &HashMap<String, String>) -> Specfile {
        let mut copy = self.clone();
        copy.applied_example = Some(example.clone());

        for cmd in &mut copy.commands {
            cmd.command = interpolate_braces(&cmd.command, example);
            cmd.line = interpolate_braces(&cmd.line, example);
            cmd.expected = interpolate_braces(&cmd.expected, example);
        }

        copy
    }
}

/// Replace `{name}` placeholders with values from `vars`. Placeholders
/// whose name is not present in `vars` are left untouched: an example
/// mapping only needs to cover the placeholders it actually uses, and an
/// empty `vars` (the identity substitution) must be a no-op per §8.
pub fn interpolate_braces(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                out.push('{');
                i += 2;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                out.push('}');
                i += 2;
            }
            b'{' => {
                if let Some(end) = template[i + 1..].find('}') {
                    let name = &template[i + 1..i + 1 + end];
                    if let Some(value) = vars.get(name) {
                        out.push_str(value);
                    } else {
                        out.push_str(&template[i..i + 1 + end + 1]);
                    }
                    i = i + 1 + end + 1;
                } else {
                    out.push('{');
                    i += 1;
                }
            }
            b => {
                out.push(b as char);
                i += 1;
            }
        }
    }

    out
}
