//! Runner-level end-to-end scenarios driven against a real local bash,
//! mirroring the session crate's own live-session tests. These spawn an
//! actual nested shell per run, so they are skipped on non-unix targets.

#![cfg(unix)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use shellinspector_parser::parse_str;
use shellinspector_runner::{Event, EventKind, Reporter, Runner};

#[derive(Clone, Default)]
struct Capture(Rc<RefCell<Vec<Event>>>);

impl Capture {
    fn kinds(&self) -> Vec<EventKind> {
        self.0.borrow().iter().map(|e| e.kind).collect()
    }

    fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }
}

impl Reporter for Capture {
    fn on_event(&mut self, event: &Event) {
        self.0.borrow_mut().push(event.clone());
    }
}

fn runner() -> (Runner, Capture) {
    let capture = Capture::default();
    let reporter: Box<dyn Reporter> = Box::new(capture.clone());
    (Runner::new(None, HashMap::new(), reporter), capture)
}

#[test]
fn logout_mid_file_recreates_the_session_on_next_use() {
    let (mut r, capture) = runner();
    let specfile = parse_str(
        std::path::Path::new("logout.ispec"),
        "[root@local]% echo a\na\n[root@local]% logout\n\n[root@local]% echo b\nb\n",
    );

    let passed = r.run(&specfile);
    assert!(passed, "run should pass");

    let kinds = capture.kinds();
    let starting = kinds
        .iter()
        .filter(|k| **k == EventKind::CommandStarting)
        .count();
    let passed_events = kinds
        .iter()
        .filter(|k| **k == EventKind::CommandPassed)
        .count();
    assert_eq!(starting, 3);
    assert_eq!(passed_events, 3);
}

#[test]
fn environment_isolation_across_two_sequential_runs_in_one_process() {
    let (mut r, capture) = runner();

    let first = parse_str(
        std::path::Path::new("first.ispec"),
        "---\nenvironment:\n  FOO: bar\n---\n[a@local]$ echo $FOO\nbar\n",
    );
    let second = parse_str(
        std::path::Path::new("second.ispec"),
        "---\nenvironment:\n  FOO: baz\n---\n[a@local]$ echo $FOO\nbaz\n",
    );

    assert!(r.run(&first), "first run should pass with FOO=bar");
    assert!(r.run(&second), "second run should pass with FOO=baz");

    let passed = capture
        .events()
        .iter()
        .filter(|e| e.kind == EventKind::CommandPassed)
        .count();
    assert_eq!(passed, 2);
}

#[test]
fn fixture_pre_and_post_share_one_session_with_the_body() {
    let tmp = tempfile::tempdir().unwrap();
    let fx_dir = tmp.path().join("fx");
    std::fs::create_dir_all(&fx_dir).unwrap();
    std::fs::write(
        fx_dir.join("counter_pre.ispec"),
        "[a@local]$ export SI_FIXTURE_MARK=pre\n\n",
    )
    .unwrap();
    std::fs::write(
        fx_dir.join("counter_post.ispec"),
        "[a@local]$ echo $SI_FIXTURE_MARK\npre\n",
    )
    .unwrap();

    let main_path = tmp.path().join("main.ispec");
    std::fs::write(
        &main_path,
        "---\nfixture: counter\nsettings:\n  fixture_dirs: [./fx]\n---\n[a@local]$ echo $SI_FIXTURE_MARK\npre\n",
    )
    .unwrap();

    let specfile = shellinspector_parser::parse(&main_path).unwrap();
    assert!(specfile.is_runnable());

    let (mut r, capture) = runner();
    let passed = r.run(&specfile);
    assert!(
        passed,
        "fixture pre/post should share the body's session and see SI_FIXTURE_MARK: {:?}",
        capture.events()
    );
}
