//! §4.D fixture attachment: `<name>_pre.ispec` / `<name>_post.ispec`
//! resolved against `settings.fixture_dirs`.

use std::path::Path;

use crate::config::FixtureDecl;
use crate::model::{Error, Specfile};

/// Attach `decl`'s pre/post spec files to `specfile`, searching
/// `specfile.settings.fixture_dirs` in order for the first existing
/// `<name>_pre.ispec` and `<name>_post.ispec`. Either, both, or neither
/// may exist; if neither does, an `Error` is recorded since a `fixture:`
/// declaration with nothing to run is a mistake worth surfacing.
pub fn resolve_fixture(
    specfile: &mut Specfile,
    decl: &FixtureDecl,
    mut parse_fixture_file: impl FnMut(&Path) -> Specfile,
) {
    specfile.fixture = Some(decl.name.clone());
    specfile.fixture_scope = decl.scope;

    let pre = find_and_parse(specfile, &decl.name, "pre", &mut parse_fixture_file);
    let post = find_and_parse(specfile, &decl.name, "post", &mut parse_fixture_file);

    if pre.is_none() && post.is_none() {
        specfile.errors.push(Error {
            source_file: specfile.path.clone(),
            source_line_no: 0,
            source_line: String::new(),
            message: format!(
                "fixture error: neither {name}_pre.ispec nor {name}_post.ispec was found in any fixture_dirs entry",
                name = decl.name
            ),
        });
    }

    specfile.fixture_specfile_pre = pre.map(Box::new);
    specfile.fixture_specfile_post = post.map(Box::new);
}

fn find_and_parse(
    specfile: &Specfile,
    name: &str,
    suffix: &str,
    parse_fixture_file: &mut impl FnMut(&Path) -> Specfile,
) -> Option<Specfile> {
    let filename = format!("{name}_{suffix}.ispec");

    for dir in &specfile.settings.fixture_dirs {
        let candidate = dir.join(&filename);
        if candidate.is_file() {
            let mut fixture = parse_fixture_file(&candidate);
            fixture.is_fixture = true;
            return Some(fixture);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FixtureScope;
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn missing_pre_and_post_records_an_error() {
        let mut spec = Specfile::new(PathBuf::from("test.ispec"));
        spec.settings.fixture_dirs = vec![PathBuf::from("/tmp/nonexistent-fixture-dir")];

        let decl = FixtureDecl {
            name: "db".to_string(),
            scope: FixtureScope::File,
        };

        resolve_fixture(&mut spec, &decl, |_| unreachable!());

        assert_eq!(spec.errors.len(), 1);
        assert!(spec.fixture_specfile_pre.is_none());
        assert!(spec.fixture_specfile_post.is_none());
    }

    #[test]
    fn finds_and_attaches_pre_and_post() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("db_pre.ispec"), "$ setup\nok\n").unwrap();
        fs::write(tmp.path().join("db_post.ispec"), "$ teardown\nok\n").unwrap();

        let mut spec = Specfile::new(PathBuf::from("test.ispec"));
        spec.settings.fixture_dirs = vec![tmp.path().to_path_buf()];

        let decl = FixtureDecl {
            name: "db".to_string(),
            scope: FixtureScope::Run,
        };

        resolve_fixture(&mut spec, &decl, |path| {
            let mut s = Specfile::new(path.to_path_buf());
            s.commands.push(crate::model::Command {
                execution_mode: crate::model::ExecutionMode::User,
                assert_mode: crate::model::AssertMode::Literal,
                command: "noop".to_string(),
                user: Some("a".to_string()),
                host: "local".to_string(),
                session_name: None,
                expected: "ok".to_string(),
                source_file: path.to_path_buf(),
                source_line_no: 1,
                line: String::new(),
                has_heredoc: false,
            });
            s
        });

        assert!(spec.errors.is_empty());
        assert_eq!(spec.fixture_scope, FixtureScope::Run);
        assert!(spec.fixture_specfile_pre.unwrap().is_fixture);
        assert!(spec.fixture_specfile_post.unwrap().is_fixture);
    }
}
