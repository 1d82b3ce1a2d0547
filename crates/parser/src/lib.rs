//! Parses `.ispec` transcripts into a [`model::Specfile`]: front-matter,
//! project configuration, the prefix grammar, here-documents, includes,
//! and fixture attachment.

mod body;
mod config;
mod fixture;
mod frontmatter;
pub mod model;
mod prefix;

use std::path::{Path, PathBuf};

use anyhow::Context;

pub use config::{FixtureDecl, PROJECT_CONFIG_FILE};
pub use model::{
    interpolate_braces, AssertMode, Command, Error, ExecutionMode, FixtureScope, Settings,
    Specfile,
};

/// Read and parse the spec file at `path`.
pub fn parse(path: &Path) -> anyhow::Result<Specfile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading spec file {}", path.display()))?;
    Ok(parse_str(path, &content))
}

/// Parse already-loaded `content` as though it were read from `path`.
/// Used both as the public entry point's body and for recursive
/// includes/fixtures, which already hold the file's contents.
pub fn parse_str(path: &Path, content: &str) -> Specfile {
    let split = frontmatter::split(content);
    let spec_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let project = config::resolve_project_config(path);
    let merged = config::merge(&split.frontmatter, &project, spec_dir);

    let mut specfile = Specfile::new(path.to_path_buf());
    specfile.environment = merged.environment;
    specfile.examples = merged.examples;
    specfile.tags = merged.tags;
    specfile.settings = merged.settings;

    body::parse_body(
        &mut specfile,
        &split.body,
        split.body_first_line_number,
        parse_recursive,
    );

    if let Some(decl) = &merged.fixture {
        fixture::resolve_fixture(&mut specfile, decl, parse_recursive);
    }

    specfile
}

/// Read and parse a file discovered during body/fixture resolution.
/// Callers only invoke this after confirming the file exists, but a
/// read can still fail (permissions, races); in that case an otherwise
/// empty `Specfile` carrying the read error is returned so the caller's
/// error accumulation keeps working uniformly.
fn parse_recursive(path: &Path) -> Specfile {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_str(path, &content),
        Err(err) => {
            let mut specfile = Specfile::new(path.to_path_buf());
            specfile.errors.push(Error {
                source_file: path.to_path_buf(),
                source_line_no: 0,
                source_line: String::new(),
                message: format!("failed to read {}: {err}", path.display()),
            });
            specfile
        }
    }
}

/// Convenience used by the runner to resolve a relative spec path the
/// same way the parser resolves include/fixture directives.
pub fn canonical_spec_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_frontmatter_environment_and_commands() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("basic.ispec");
        fs::write(
            &path,
            "---\nenvironment:\n  GREETING: hello\n---\n[a@local]$ echo $GREETING\nhello\n",
        )
        .unwrap();

        let specfile = parse(&path).unwrap();

        assert!(specfile.is_runnable());
        assert_eq!(specfile.environment.get("GREETING").unwrap(), "hello");
        assert_eq!(specfile.commands.len(), 1);
        assert_eq!(specfile.commands[0].expected, "hello");
    }

    #[test]
    fn includes_are_resolved_relative_to_spec_directory_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("helpers.ispec"),
            "[a@local]$ echo included\nincluded\n",
        )
        .unwrap();
        let path = tmp.path().join("main.ispec");
        fs::write(&path, "<helpers.ispec\n[a@local]$ echo main\nmain\n").unwrap();

        let specfile = parse(&path).unwrap();

        assert!(specfile.is_runnable());
        assert_eq!(specfile.commands.len(), 2);
        assert_eq!(specfile.commands[0].command, "echo included");
        assert_eq!(specfile.commands[1].command, "echo main");
    }

    #[test]
    fn fixture_declaration_attaches_pre_and_post_specfiles() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("db_pre.ispec"), "[a@local]$ setup\nok\n").unwrap();
        fs::write(tmp.path().join("db_post.ispec"), "[a@local]$ teardown\nok\n").unwrap();
        let path = tmp.path().join("main.ispec");
        fs::write(
            &path,
            "---\nfixture: db\n---\n[a@local]$ echo main\nmain\n",
        )
        .unwrap();

        let specfile = parse(&path).unwrap();

        assert!(specfile.is_runnable());
        assert_eq!(specfile.fixture.as_deref(), Some("db"));
        assert!(specfile.fixture_specfile_pre.is_some());
        assert!(specfile.fixture_specfile_post.is_some());
    }

    #[test]
    fn missing_fixture_files_are_recorded_as_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("main.ispec");
        fs::write(&path, "---\nfixture: nope\n---\n[a@local]$ echo main\nmain\n").unwrap();

        let specfile = parse(&path).unwrap();

        assert!(!specfile.is_runnable());
        assert!(specfile.errors[0].message.contains("fixture error"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = parse(Path::new("/nonexistent/path/to/spec.ispec"));
        assert!(result.is_err());
    }
}
