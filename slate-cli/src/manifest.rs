//! `project.toml` parsing, used only to warn when an external import is
//! not listed under `[dependencies]`. The manifest is optional and never
//! blocks compilation.

use serde::Deserialize;
use slate_compiler::compiler::ast::{ImportKind, Program};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub project: Option<ProjectMeta>,
    #[serde(default)]
    pub dependencies: Option<toml::Table>,
}

/// `[project]` metadata; carried in full even though only the dependency
/// table drives behavior today.
#[derive(Debug, Default, Deserialize)]
#[allow(dead_code)]
pub struct ProjectMeta {
    pub name: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
}

pub fn load(dir: &Path) -> Option<Manifest> {
    let text = std::fs::read_to_string(dir.join("project.toml")).ok()?;
    match toml::from_str(&text) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            eprintln!("warning: could not parse project.toml: {e}");
            None
        }
    }
}

/// Print a warning for every external import that the manifest does not
/// list. Silent when there is no manifest at all.
pub fn warn_unlisted_externals(program: &Program, dir: &Path) {
    let externals: Vec<&str> = program
        .imports
        .iter()
        .filter(|i| i.kind == ImportKind::External)
        .map(|i| i.path.as_str())
        .collect();
    if externals.is_empty() {
        return;
    }
    let Some(manifest) = load(dir) else {
        return;
    };
    let listed: HashSet<String> = manifest
        .dependencies
        .as_ref()
        .map(|deps| deps.keys().cloned().collect())
        .unwrap_or_default();
    for name in externals {
        if !listed.contains(name) {
            eprintln!("warning: external package '{name}' is not listed in project.toml");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_project_and_dependencies() {
        let manifest: Manifest = toml::from_str(
            r#"
[project]
name = "demo"
version = "0.1.0"
author = "Someone"

[dependencies]
vectors = { version = "1.0.0", url = "github.com/user/vectors" }
"#,
        )
        .expect("manifest should parse");
        assert_eq!(manifest.project.unwrap().name.as_deref(), Some("demo"));
        assert!(manifest.dependencies.unwrap().contains_key("vectors"));
    }

    #[test]
    fn empty_manifest_is_fine() {
        let manifest: Manifest = toml::from_str("").expect("empty manifest should parse");
        assert!(manifest.project.is_none());
        assert!(manifest.dependencies.is_none());
    }
}
