//! §4.D body parsing: comments, includes, command headers, here-documents,
//! and output accumulation.

use std::path::Path;

use crate::model::{AssertMode, Command, Error, ExecutionMode, Specfile};
use crate::prefix::match_prefix;

/// Parse `body`'s lines into `specfile.commands`/`specfile.errors`. Line
/// numbers are reported starting at `first_line_no + 1`, so a caller that
/// split off N lines of front-matter can pass N here and get diagnostics
/// that point at the original file.
///
/// `read_include` loads the contents of an included/fixture spec file so
/// this function stays independent of how recursion into `parse` is
/// wired up (kept as a callback to avoid a circular module dependency
/// between body parsing and the top-level `parse` entry point).
pub fn parse_body(
    specfile: &mut Specfile,
    body: &str,
    first_line_no: usize,
    mut parse_include: impl FnMut(&Path) -> Specfile,
) {
    for (offset, line) in body.split('\n').enumerate() {
        let line_no = first_line_no + offset + 1;

        // An unterminated here-document takes priority over every other
        // rule: its body lines are captured verbatim even if they look
        // like comments, includes, or new command headers.
        if let Some(last) = specfile.commands.last_mut() {
            if last.has_heredoc && !last.heredoc_closed() {
                last.command.push('\n');
                last.command.push_str(line);
                continue;
            }
        }

        if line.starts_with('#') {
            continue;
        }

        if line.trim().is_empty() && specfile.commands.is_empty() {
            continue;
        }

        if line.starts_with('<') {
            resolve_include(specfile, line, line_no, &mut parse_include);
            continue;
        }

        if let Some(prefix) = match_prefix(line) {
            push_command(specfile, line, line_no, prefix);
            continue;
        }

        if let Some(last) = specfile.commands.last_mut() {
            last.expected.push_str(line);
            last.expected.push('\n');
            continue;
        }

        specfile.errors.push(Error {
            source_file: specfile.path.clone(),
            source_line_no: line_no,
            source_line: line.to_string(),
            message: "syntax error: output before first command, missing prefix?".to_string(),
        });
    }

    finalize_assert_modes(specfile);
}

fn resolve_include(
    specfile: &mut Specfile,
    line: &str,
    line_no: usize,
    parse_include: &mut impl FnMut(&Path) -> Specfile,
) {
    let rel = &line[1..];

    for dir in &specfile.settings.include_dirs.clone() {
        let candidate = dir.join(rel);
        if candidate.is_file() {
            let included = parse_include(&candidate);
            specfile.errors.extend(included.errors);
            specfile.commands.extend(included.commands);
            return;
        }
    }

    specfile.errors.push(Error {
        source_file: specfile.path.clone(),
        source_line_no: line_no,
        source_line: line.to_string(),
        message: format!("include error: {rel} does not exist in any include_dirs entry"),
    });
}

fn push_command(
    specfile: &mut Specfile,
    line: &str,
    line_no: usize,
    prefix: crate::prefix::PrefixMatch,
) {
    let command_text = line[prefix.command_start..].to_string();
    let has_heredoc = command_text.ends_with("<<HERE");

    let mut user = prefix.user;
    let mut host = prefix.host;
    let execution_mode = prefix.execution_mode;

    if execution_mode == ExecutionMode::Root {
        user = Some("root".to_string());
    }

    // §4.D legacy rule (resolved per original_source/parser.py): reuse
    // user/host from the most recent prior command of the same
    // execution_mode; only default host to "remote" when there is none.
    match specfile
        .commands
        .iter()
        .rev()
        .find(|c| c.execution_mode == execution_mode)
    {
        Some(last) => {
            user = user.or_else(|| last.user.clone());
            host = host.or_else(|| Some(last.host.clone()));
        }
        None => {
            host = host.or_else(|| Some("remote".to_string()));
        }
    }

    let host = host.unwrap_or_else(|| "remote".to_string());

    if user.is_none() && execution_mode == ExecutionMode::User && host != "local" {
        specfile.errors.push(Error {
            source_file: specfile.path.clone(),
            source_line_no: line_no,
            source_line: line.to_string(),
            message: "syntax error: command (and all before it) do not have a user specified"
                .to_string(),
        });
    }

    specfile.commands.push(Command {
        execution_mode,
        assert_mode: prefix.assert_mode,
        command: command_text,
        user,
        host,
        session_name: prefix.session_name,
        expected: String::new(),
        source_file: specfile.path.clone(),
        source_line_no: line_no,
        line: line.to_string(),
        has_heredoc,
    });
}

fn finalize_assert_modes(specfile: &mut Specfile) {
    for cmd in &mut specfile.commands {
        match cmd.assert_mode {
            AssertMode::Regex => {
                cmd.expected = cmd.expected.trim_end_matches(['\n', '\r']).to_string();
            }
            AssertMode::Literal => {
                cmd.expected = cmd
                    .expected
                    .trim_matches(['\r', '\n'])
                    .to_string();
            }
            AssertMode::Ignore => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fresh(path: &str) -> Specfile {
        Specfile::new(PathBuf::from(path))
    }

    #[test]
    fn basic_literal_command() {
        let mut spec = fresh("test.ispec");
        parse_body(&mut spec, "[a@local]$ echo a\na\n", 0, |_| unreachable!());

        assert_eq!(spec.commands.len(), 1);
        let c = &spec.commands[0];
        assert_eq!(c.command, "echo a");
        assert_eq!(c.expected, "a");
        assert_eq!(c.host, "local");
        assert!(spec.errors.is_empty());
    }

    #[test]
    fn orphan_output_before_first_command_is_an_error() {
        let mut spec = fresh("test.ispec");
        parse_body(&mut spec, "random text1\n% ls\nfile\n", 0, |_| unreachable!());

        assert_eq!(spec.errors.len(), 1);
        assert_eq!(spec.errors[0].source_line_no, 1);
        assert_eq!(spec.commands.len(), 1);
        assert_eq!(spec.commands[0].expected, "file");
    }

    #[test]
    fn root_command_forces_root_user() {
        let mut spec = fresh("test.ispec");
        parse_body(&mut spec, "% whoami\nroot\n", 0, |_| unreachable!());
        assert_eq!(spec.commands[0].user.as_deref(), Some("root"));
    }

    #[test]
    fn user_command_without_user_or_local_host_is_an_error() {
        let mut spec = fresh("test.ispec");
        parse_body(&mut spec, "$ echo a\na\n", 0, |_| unreachable!());
        assert_eq!(spec.errors.len(), 1);
        assert!(spec.errors[0].message.contains("do not have a user"));
    }

    #[test]
    fn user_and_host_are_inherited_from_prior_same_mode_command() {
        let mut spec = fresh("test.ispec");
        parse_body(
            &mut spec,
            "[alice@staging]$ echo a\na\n$ echo b\nb\n",
            0,
            |_| unreachable!(),
        );

        assert_eq!(spec.commands[1].user.as_deref(), Some("alice"));
        assert_eq!(spec.commands[1].host, "staging");
        assert!(spec.errors.is_empty());
    }

    #[test]
    fn heredoc_absorbs_lines_until_here_terminator() {
        let mut spec = fresh("test.ispec");
        parse_body(
            &mut spec,
            "[a@local]$ cat <<HERE\nline one\nline two\nHERE\nexpected output\n",
            0,
            |_| unreachable!(),
        );

        assert_eq!(spec.commands.len(), 1);
        assert_eq!(spec.commands[0].command, "cat <<HERE\nline one\nline two\nHERE");
        assert_eq!(spec.commands[0].expected, "expected output");
    }

    #[test]
    fn regex_mode_strips_only_trailing_newlines() {
        let mut spec = fresh("test.ispec");
        parse_body(
            &mut spec,
            "[a@local]%~ /usr/bin/which --help\nUsage: .*\nWrite the full path\n",
            0,
            |_| unreachable!(),
        );

        assert_eq!(spec.commands[0].expected, "Usage: .*\nWrite the full path");
    }

    #[test]
    fn include_directive_splices_in_commands_and_errors() {
        let mut spec = fresh("test.ispec");
        spec.settings.include_dirs = vec![PathBuf::from("/tmp/does-not-matter")];

        parse_body(&mut spec, "<helpers.ispec\n", 0, |_path| {
            let mut included = Specfile::new(PathBuf::from("helpers.ispec"));
            included.commands.push(Command {
                execution_mode: ExecutionMode::User,
                assert_mode: AssertMode::Literal,
                command: "echo included".to_string(),
                user: None,
                host: "local".to_string(),
                session_name: None,
                expected: "included".to_string(),
                source_file: PathBuf::from("helpers.ispec"),
                source_line_no: 1,
                line: "[a@local]$ echo included".to_string(),
                has_heredoc: false,
            });
            included
        });

        // The callback never checks file existence in this unit test, so
        // exercise the "found" path directly via a tempdir-backed test
        // below instead; here we only verify wiring when the candidate
        // directory genuinely doesn't contain the file.
        assert_eq!(spec.errors.len(), 1);
        assert!(spec.errors[0].message.contains("include error"));
    }

    #[test]
    fn include_directive_found_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("helpers.ispec"), "[a@local]$ echo included\nincluded\n")
            .unwrap();

        let mut spec = fresh("test.ispec");
        spec.settings.include_dirs = vec![tmp.path().to_path_buf()];

        parse_body(&mut spec, "<helpers.ispec\n", 0, |path| {
            let content = std::fs::read_to_string(path).unwrap();
            let mut included = Specfile::new(path.to_path_buf());
            parse_body(&mut included, &content, 0, |_| unreachable!());
            included
        });

        assert!(spec.errors.is_empty());
        assert_eq!(spec.commands.len(), 1);
        assert_eq!(spec.commands[0].command, "echo included");
    }
}
