//! End-to-end parser scenarios, one per named case in the testable
//! properties section of the design: a spec file is written to a temp
//! directory tree and parsed through the public `parse()` entry point,
//! exercising the front-matter splitter, prefix grammar, include/fixture
//! resolution and config merge together rather than in isolation.

use std::fs;

use pretty_assertions::assert_eq as pretty_assert_eq;
use shellinspector_parser::{parse, AssertMode, ExecutionMode};

fn write(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write fixture spec");
    path
}

#[test]
fn basic_literal_strips_trailing_newline_from_expected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write(tmp.path(), "basic.ispec", "[a@local]$ echo a\na\n");

    let specfile = parse(&path).unwrap();

    assert!(specfile.is_runnable());
    assert_eq!(specfile.commands.len(), 1);
    let cmd = &specfile.commands[0];
    assert_eq!(cmd.execution_mode, ExecutionMode::User);
    assert_eq!(cmd.assert_mode, AssertMode::Literal);
    assert_eq!(cmd.expected, "a");
    assert_eq!(cmd.host, "local");
}

#[test]
fn regex_multiline_assertion_survives_parse_unstripped_of_internal_newlines() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write(
        tmp.path(),
        "which.ispec",
        "%~ /usr/bin/which --help\nUsage: .*\nWrite the full path\n",
    );

    let specfile = parse(&path).unwrap();

    assert!(specfile.is_runnable());
    assert_eq!(specfile.commands.len(), 1);
    let cmd = &specfile.commands[0];
    assert_eq!(cmd.execution_mode, ExecutionMode::Root);
    assert_eq!(cmd.assert_mode, AssertMode::Regex);
    assert_eq!(cmd.user.as_deref(), Some("root"));
    assert_eq!(cmd.expected, "Usage: .*\nWrite the full path");
}

#[test]
fn orphan_output_before_first_command_is_recorded_as_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write(tmp.path(), "orphan.ispec", "random text1\n% ls\nfile\n");

    let specfile = parse(&path).unwrap();

    assert!(!specfile.is_runnable());
    assert_eq!(specfile.errors.len(), 1);
    assert_eq!(specfile.errors[0].source_line_no, 1);
    assert!(specfile.errors[0].message.contains("before first command"));

    assert_eq!(specfile.commands.len(), 1);
    assert_eq!(specfile.commands[0].command, "ls");
    assert_eq!(specfile.commands[0].expected, "file");
}

#[test]
fn include_and_fixture_directives_resolve_relative_to_their_declaring_file() {
    let tmp = tempfile::tempdir().unwrap();
    let fx_dir = tmp.path().join("fx");
    fs::create_dir_all(&fx_dir).unwrap();

    write(
        &fx_dir,
        "create_user_pre.ispec",
        "[root@local]% useradd demo\n\n",
    );
    write(
        &fx_dir,
        "create_user_post.ispec",
        "[root@local]% userdel demo\n\n",
    );

    let path = write(
        tmp.path(),
        "main.ispec",
        "---\nfixture: create_user\nsettings:\n  fixture_dirs: [./fx]\n---\n[a@local]$ id demo\ndemo\n",
    );

    let specfile = parse(&path).unwrap();

    assert!(specfile.is_runnable());
    assert_eq!(specfile.fixture.as_deref(), Some("create_user"));

    let pre = specfile.fixture_specfile_pre.as_ref().expect("pre attached");
    assert_eq!(pre.commands[0].command, "useradd demo");
    let post = specfile
        .fixture_specfile_post
        .as_ref()
        .expect("post attached");
    assert_eq!(post.commands[0].command, "userdel demo");

    assert_eq!(specfile.commands.len(), 1);
    assert_eq!(specfile.commands[0].command, "id demo");
}

#[test]
fn include_directive_pulls_commands_into_the_including_file_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "helpers.ispec",
        "[a@local]$ echo included\nincluded\n",
    );
    let path = write(
        tmp.path(),
        "main.ispec",
        "<helpers.ispec\n[a@local]$ echo main\nmain\n",
    );

    let specfile = parse(&path).unwrap();

    assert!(specfile.is_runnable());
    assert_eq!(specfile.commands.len(), 2);
    assert_eq!(specfile.commands[0].command, "echo included");
    assert_eq!(specfile.commands[1].command, "echo main");
}

#[test]
fn parsing_the_same_file_twice_yields_structurally_equal_results() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write(
        tmp.path(),
        "idempotent.ispec",
        "---\nenvironment:\n  FOO: bar\n---\n$ echo $FOO\nbar\n",
    );

    let first = parse(&path).unwrap();
    let second = parse(&path).unwrap();

    assert_eq!(first.commands.len(), second.commands.len());
    pretty_assert_eq!(first.commands[0].command, second.commands[0].command);
    pretty_assert_eq!(first.commands[0].expected, second.commands[0].expected);
    pretty_assert_eq!(first.environment, second.environment);
}

#[test]
fn as_example_identity_substitution_leaves_commands_unchanged() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write(tmp.path(), "plain.ispec", "$ echo hi\nhi\n");
    let specfile = parse(&path).unwrap();

    let copy = specfile.as_example(&std::collections::HashMap::new());

    assert_eq!(copy.commands[0].command, specfile.commands[0].command);
    assert_eq!(copy.commands[0].expected, specfile.commands[0].expected);
    assert!(copy.applied_example.is_some());
    assert!(specfile.applied_example.is_none());
}

#[test]
fn as_example_interpolates_braces_without_mutating_the_original() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write(
        tmp.path(),
        "parameterized.ispec",
        "---\nexamples:\n  - name: demo\n---\n$ echo {name}\n{name}\n",
    );
    let specfile = parse(&path).unwrap();
    assert_eq!(specfile.examples.len(), 1);

    let applied = specfile.as_example(&specfile.examples[0]);

    assert_eq!(applied.commands[0].command, "echo demo");
    assert_eq!(applied.commands[0].expected, "demo");
    assert_eq!(specfile.commands[0].command, "echo {name}");
}
