//! Path resolution for stage file requirements
//!
//! Expands literal paths, glob patterns and explicit mappings against a base
//! directory. Literal and explicit entries must exist; a pattern that matches
//! nothing simply contributes no files.

use globset::GlobBuilder;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use super::{PathMapping, PathSpec};
use crate::error::GradeError;

/// Resolve declared paths against `base_dir` into source/target pairs
pub fn resolve_paths(paths: &[PathSpec], base_dir: &Path) -> Result<Vec<PathMapping>, GradeError> {
    let mut resolved = Vec::new();

    for path in paths {
        match path {
            PathSpec::Mapping(mapping) => {
                check_target(&mapping.target)?;
                resolved.push(PathMapping {
                    source: existing_source(&base_dir.join(&mapping.source))?,
                    target: mapping.target.clone(),
                });
            }
            PathSpec::Path(pattern) if path.is_pattern() => {
                resolved.extend(expand_pattern(pattern, base_dir)?);
            }
            PathSpec::Path(literal) => {
                let target = PathBuf::from(literal);
                check_target(&target)?;
                resolved.push(PathMapping {
                    source: existing_source(&base_dir.join(literal))?,
                    target,
                });
            }
        }
    }

    Ok(resolved)
}

/// Canonicalize a declared source, failing with `MissingInput` when absent
fn existing_source(path: &Path) -> Result<PathBuf, GradeError> {
    path.canonicalize().map_err(|e| match e.kind() {
        ErrorKind::NotFound => GradeError::MissingInput {
            path: path.to_path_buf(),
        },
        _ => GradeError::io(path, e),
    })
}

/// Targets must stay inside the sandbox
fn check_target(target: &Path) -> Result<(), GradeError> {
    let enclosed = !target.as_os_str().is_empty()
        && target
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

    if enclosed {
        Ok(())
    } else {
        Err(GradeError::InvalidTarget {
            target: target.to_path_buf(),
        })
    }
}

/// Drop `.` segments so the pattern lines up with walked relative paths
fn normalize_pattern(pattern: &str) -> Result<String, GradeError> {
    let mut segments = Vec::new();
    for component in Path::new(pattern).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(segment) => segments.push(segment.to_string_lossy()),
            _ => {
                return Err(GradeError::InvalidTarget {
                    target: PathBuf::from(pattern),
                })
            }
        }
    }
    Ok(segments.join("/"))
}

/// Expand a glob against `base_dir`, targets keep their path relative to it
fn expand_pattern(pattern: &str, base_dir: &Path) -> Result<Vec<PathMapping>, GradeError> {
    let pattern = normalize_pattern(pattern)?;
    let pattern = pattern.as_str();
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|source| GradeError::Glob {
            pattern: pattern.to_string(),
            source,
        })?
        .compile_matcher();

    let base = match base_dir.canonicalize() {
        Ok(base) => base,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(GradeError::io(base_dir, e)),
    };

    // Patterns without `**` can only match up to their own depth
    let max_depth = if pattern.contains("**") {
        usize::MAX
    } else {
        pattern.split('/').count()
    };

    let mut matches = Vec::new();
    for entry in WalkDir::new(&base)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| GradeError::io(&base, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(&base) else {
            continue;
        };
        if matcher.is_match(relative) {
            matches.push(PathMapping {
                source: entry.path().to_path_buf(),
                target: relative.to_path_buf(),
            });
        }
    }

    debug!(
        "Pattern {:?} in {:?} matched {} file(s)",
        pattern,
        base,
        matches.len()
    );

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/util")).unwrap();
        fs::write(dir.path().join("src/main.c"), "int main() {}").unwrap();
        fs::write(dir.path().join("src/list.c"), "// list").unwrap();
        fs::write(dir.path().join("src/util/hash.c"), "// hash").unwrap();
        fs::write(dir.path().join("Makefile"), "all:").unwrap();
        dir
    }

    #[test]
    fn test_literal_keeps_target() {
        let dir = fixture();
        let files = resolve_paths(&["src/main.c".into()], dir.path()).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].target, PathBuf::from("src/main.c"));
        assert_eq!(
            files[0].source,
            dir.path().join("src/main.c").canonicalize().unwrap()
        );
    }

    #[test]
    fn test_mapping_resolves_source_only() {
        let dir = fixture();
        let mapping = PathSpec::Mapping(PathMapping {
            source: "Makefile".into(),
            target: "build/Makefile".into(),
        });
        let files = resolve_paths(&[mapping], dir.path()).unwrap();

        assert_eq!(files[0].target, PathBuf::from("build/Makefile"));
        assert!(files[0].source.is_absolute());
    }

    #[test]
    fn test_glob_preserves_subdirectories() {
        let dir = fixture();

        let flat = resolve_paths(&["src/*.c".into()], dir.path()).unwrap();
        let targets: Vec<_> = flat.iter().map(|f| f.target.clone()).collect();
        assert_eq!(
            targets,
            vec![PathBuf::from("src/list.c"), PathBuf::from("src/main.c")]
        );

        let deep = resolve_paths(&["src/**/*.c".into()], dir.path()).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep
            .iter()
            .any(|f| f.target == PathBuf::from("src/util/hash.c")));
    }

    #[test]
    fn test_glob_without_matches_is_empty() {
        let dir = fixture();
        let files = resolve_paths(&["*.py".into()], dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_missing_literal_fails_fast() {
        let dir = fixture();
        let err = resolve_paths(&["missing.txt".into()], dir.path()).unwrap_err();
        match err {
            GradeError::MissingInput { path } => assert!(path.ends_with("missing.txt")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_glob_ignores_current_dir_prefix() {
        let dir = fixture();

        let plain = resolve_paths(&["src/*.c".into()], dir.path()).unwrap();
        let dotted = resolve_paths(&["./src/*.c".into()], dir.path()).unwrap();
        assert_eq!(dotted, plain);
        assert!(dotted.iter().all(|f| !f.target.starts_with(".")));

        let top = resolve_paths(&["./*".into()], dir.path()).unwrap();
        let targets: Vec<_> = top.iter().map(|f| f.target.clone()).collect();
        assert_eq!(targets, vec![PathBuf::from("Makefile")]);
    }

    #[test]
    fn test_glob_outside_base_is_rejected() {
        let dir = fixture();
        for pattern in ["../*.c", "/etc/*", "src/../../*"] {
            let err = resolve_paths(&[pattern.into()], dir.path()).unwrap_err();
            assert!(matches!(err, GradeError::InvalidTarget { .. }), "{pattern}");
        }
    }

    #[test]
    fn test_escaping_target_is_rejected() {
        let dir = fixture();
        let mapping = PathSpec::Mapping(PathMapping {
            source: "Makefile".into(),
            target: "../outside".into(),
        });
        let err = resolve_paths(&[mapping], dir.path()).unwrap_err();
        assert!(matches!(err, GradeError::InvalidTarget { .. }));
    }
}
