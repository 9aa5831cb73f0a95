use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::environment::Environment;

/// Outcome of a program lookup. The distinction matters for exit codes:
/// a missing program reports 127, a non-executable one 126.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    Found(PathBuf),
    NotExecutable(PathBuf),
    NotFound,
}

pub struct PathResolver;

impl PathResolver {
    /// Resolve a command name. A name containing `/` is used as a path
    /// directly; anything else is searched along `PATH`.
    pub fn resolve(&self, command: &str, env: &Environment) -> Resolution {
        if command.contains('/') {
            let path = Path::new(command);
            return if path.is_file() {
                if is_executable(path) {
                    Resolution::Found(path.to_path_buf())
                } else {
                    Resolution::NotExecutable(path.to_path_buf())
                }
            } else {
                Resolution::NotFound
            };
        }

        let Some(paths) = env.get("PATH") else {
            return Resolution::NotFound;
        };
        let mut non_executable = None;
        for dir in std::env::split_paths(paths) {
            let candidate = dir.join(command);
            if candidate.is_file() {
                if is_executable(&candidate) {
                    return Resolution::Found(candidate);
                }
                non_executable.get_or_insert(candidate);
            }
        }
        match non_executable {
            Some(path) => Resolution::NotExecutable(path),
            None => Resolution::NotFound,
        }
    }
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn env_with_path(dir: &TempDir) -> Environment {
        let mut env = Environment::empty();
        env.set("PATH", &dir.path().to_string_lossy());
        env
    }

    #[test]
    fn finds_executable_on_path() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("tool");
        let mut f = File::create(&bin).unwrap();
        f.write_all(b"#!/bin/sh\n").unwrap();
        let mut perms = std::fs::metadata(&bin).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&bin, perms).unwrap();

        let env = env_with_path(&dir);
        assert_eq!(
            PathResolver.resolve("tool", &env),
            Resolution::Found(bin)
        );
    }

    #[test]
    fn non_executable_is_distinguished() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("data");
        File::create(&file).unwrap();
        let mut perms = std::fs::metadata(&file).unwrap().permissions();
        perms.set_mode(0o644);
        std::fs::set_permissions(&file, perms).unwrap();

        let env = env_with_path(&dir);
        assert_eq!(
            PathResolver.resolve("data", &env),
            Resolution::NotExecutable(file)
        );
    }

    #[test]
    fn missing_command_not_found() {
        let dir = TempDir::new().unwrap();
        let env = env_with_path(&dir);
        assert_eq!(PathResolver.resolve("no_such_tool", &env), Resolution::NotFound);
    }

    #[test]
    fn slash_names_skip_path_search() {
        let env = Environment::empty();
        assert_eq!(
            PathResolver.resolve("/definitely/not/here", &env),
            Resolution::NotFound
        );
    }
}
