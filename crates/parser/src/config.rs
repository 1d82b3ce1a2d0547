//! §4.C Config resolver and §4.D merge semantics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use shellinspector_common::{expand_vars, resolve_relative};

use crate::model::{FixtureScope, Settings};

pub const PROJECT_CONFIG_FILE: &str = "shellinspector.yaml";

/// The project-wide configuration located by walking up from a spec path,
/// together with the directory it was found in (used as the base for its
/// relative directory lists).
pub struct ProjectConfig {
    pub value: Value,
    pub base_dir: Option<PathBuf>,
}

/// §4.C: walk upward from `spec_path` until a directory containing
/// `shellinspector.yaml` is found, or a `.git` marker / filesystem root is
/// reached (that directory is checked before stopping). Missing file
/// yields an empty map.
pub fn resolve_project_config(spec_path: &Path) -> ProjectConfig {
    let mut dir = match spec_path.parent() {
        Some(p) => p.to_path_buf(),
        None => {
            return ProjectConfig {
                value: Value::Null,
                base_dir: None,
            }
        }
    };

    loop {
        let candidate = dir.join(PROJECT_CONFIG_FILE);
        if candidate.is_file() {
            let value = std::fs::read_to_string(&candidate)
                .ok()
                .and_then(|text| serde_yaml::from_str(&text).ok())
                .unwrap_or(Value::Null);
            return ProjectConfig {
                value,
                base_dir: Some(dir),
            };
        }

        if dir.join(".git").exists() {
            break;
        }

        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => break,
        }
    }

    ProjectConfig {
        value: Value::Null,
        base_dir: None,
    }
}

/// Parsed fixture declaration: `fixture: name` or
/// `fixture: {name, scope}`.
#[derive(Debug, Clone)]
pub struct FixtureDecl {
    pub name: String,
    pub scope: FixtureScope,
}

/// Everything the merge (§4.D) produces, ready for the spec body parser
/// to consume.
pub struct MergedConfig {
    pub environment: HashMap<String, String>,
    pub examples: Vec<HashMap<String, String>>,
    pub fixture: Option<FixtureDecl>,
    pub tags: Vec<String>,
    pub settings: Settings,
}

fn as_mapping(value: &Value) -> Option<&serde_yaml::Mapping> {
    value.as_mapping()
}

fn get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    as_mapping(value).and_then(|m| m.get(Value::String(key.to_string())))
}

fn string_map(value: &Value) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(mapping) = as_mapping(value) {
        for (k, v) in mapping {
            if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
                out.insert(k.to_string(), v.to_string());
            }
        }
    }
    out
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_sequence()
        .map(|seq| {
            seq.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn example_list(value: &Value) -> Vec<HashMap<String, String>> {
    value
        .as_sequence()
        .map(|seq| seq.iter().map(string_map).collect())
        .unwrap_or_default()
}

fn parse_fixture(value: &Value) -> Option<FixtureDecl> {
    if let Some(name) = value.as_str() {
        return Some(FixtureDecl {
            name: name.to_string(),
            scope: FixtureScope::File,
        });
    }

    let mapping = as_mapping(value)?;
    let name = mapping.get(Value::String("name".to_string()))?.as_str()?;
    let scope = mapping
        .get(Value::String("scope".to_string()))
        .and_then(Value::as_str)
        .map(|s| match s.to_ascii_uppercase().as_str() {
            "RUN" => FixtureScope::Run,
            _ => FixtureScope::File,
        })
        .unwrap_or(FixtureScope::File);

    Some(FixtureDecl {
        name: name.to_string(),
        scope,
    })
}

fn resolve_dirs(
    frontmatter: &Value,
    project: &Value,
    spec_dir: &Path,
    project_base: Option<&Path>,
    key: &str,
) -> Vec<PathBuf> {
    let from_frontmatter = get(frontmatter, "settings").and_then(|s| get(s, key));
    let from_project = get(project, "settings").and_then(|s| get(s, key));

    let (raw, base) = if let Some(v) = from_frontmatter {
        (string_list(v), spec_dir)
    } else if let Some(v) = from_project {
        (string_list(v), project_base.unwrap_or(spec_dir))
    } else {
        (Vec::new(), spec_dir)
    };

    let mut dirs: Vec<PathBuf> = raw
        .into_iter()
        .map(|d| resolve_relative(base, Path::new(&d)))
        .collect();

    if !dirs.contains(&spec_dir.to_path_buf()) {
        dirs.push(spec_dir.to_path_buf());
    }

    dirs
}

/// §4.D precedence: spec front-matter, then project config, then
/// built-in defaults. Each key is assigned wholesale from the
/// highest-precedence layer that defines it; `settings.*` sub-keys are
/// resolved independently of one another.
pub fn merge(frontmatter: &Value, project: &ProjectConfig, spec_dir: &Path) -> MergedConfig {
    let project_value = &project.value;
    let project_base = project.base_dir.as_deref();

    let environment = get(frontmatter, "environment")
        .map(string_map)
        .or_else(|| get(project_value, "environment").map(string_map))
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k.clone(), expand_vars(&v, |name| std::env::var(name).ok())))
        .collect();

    let examples = get(frontmatter, "examples")
        .map(example_list)
        .or_else(|| get(project_value, "examples").map(example_list))
        .unwrap_or_default();

    let fixture = get(frontmatter, "fixture")
        .and_then(parse_fixture)
        .or_else(|| get(project_value, "fixture").and_then(parse_fixture));

    let tags = get(frontmatter, "tags")
        .map(string_list)
        .or_else(|| get(project_value, "tags").map(string_list))
        .unwrap_or_default();

    let timeout_seconds = get(frontmatter, "settings")
        .and_then(|s| get(s, "timeout_seconds"))
        .and_then(Value::as_u64)
        .or_else(|| {
            get(project_value, "settings")
                .and_then(|s| get(s, "timeout_seconds"))
                .and_then(Value::as_u64)
        })
        .unwrap_or(5);

    let include_dirs = resolve_dirs(frontmatter, project_value, spec_dir, project_base, "include_dirs");
    let fixture_dirs = resolve_dirs(frontmatter, project_value, spec_dir, project_base, "fixture_dirs");

    MergedConfig {
        environment,
        examples,
        fixture,
        tags,
        settings: Settings {
            timeout_seconds,
            include_dirs,
            fixture_dirs,
        },
    }
}
