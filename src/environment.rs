use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
struct Variable {
    value: String,
    exported: bool,
}

/// Saved state of one `local` declaration: the shadowed variable, or
/// `None` when the name was unset before the function ran.
type Shadowed = Option<Variable>;

/// The shell's variable store. OS environment variables are imported (and
/// marked exported) at startup; only exported entries are passed on to
/// child processes. Function calls push a scope so `local` declarations
/// can be unwound on return.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    vars: HashMap<String, Variable>,
    scopes: Vec<HashMap<String, Shadowed>>,
}

impl Environment {
    pub fn new() -> Self {
        let mut env = Environment {
            vars: HashMap::new(),
            scopes: Vec::new(),
        };
        for (k, v) in std::env::vars() {
            env.vars.insert(
                k,
                Variable {
                    value: v,
                    exported: true,
                },
            );
        }
        // PWD is maintained by the shell itself from here on.
        if let Ok(pwd) = std::env::current_dir() {
            env.set("PWD", &pwd.to_string_lossy());
            env.export("PWD");
        }
        env
    }

    /// An empty store, for tests that need full control.
    pub fn empty() -> Self {
        Environment {
            vars: HashMap::new(),
            scopes: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|v| v.value.as_str())
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.vars
            .entry(key.to_string())
            .and_modify(|var| var.value = value.to_string())
            .or_insert(Variable {
                value: value.to_string(),
                exported: false,
            });
    }

    pub fn unset(&mut self, key: &str) {
        self.vars.remove(key);
    }

    pub fn export(&mut self, key: &str) {
        if let Some(var) = self.vars.get_mut(key) {
            var.exported = true;
        }
    }

    pub fn is_exported(&self, key: &str) -> bool {
        self.vars.get(key).map(|v| v.exported).unwrap_or(false)
    }

    pub fn all(&self) -> Vec<(String, String)> {
        let mut entries: Vec<_> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        entries.sort();
        entries
    }

    pub fn exported_vars(&self) -> Vec<(String, String)> {
        let mut entries: Vec<_> = self
            .vars
            .iter()
            .filter(|(_, v)| v.exported)
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        entries.sort();
        entries
    }

    /// Enter a function scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Leave a function scope, restoring everything `local` shadowed.
    pub fn pop_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        for (name, shadowed) in scope {
            match shadowed {
                Some(var) => {
                    self.vars.insert(name, var);
                }
                None => {
                    self.vars.remove(&name);
                }
            }
        }
    }

    pub fn in_scope(&self) -> bool {
        !self.scopes.is_empty()
    }

    /// Declare a name local to the innermost scope. The current value is
    /// remembered once per scope and restored on `pop_scope`.
    pub fn set_local(&mut self, key: &str, value: &str) -> bool {
        let shadowed = self.vars.get(key).cloned();
        let Some(scope) = self.scopes.last_mut() else {
            return false;
        };
        scope.entry(key.to_string()).or_insert(shadowed);
        self.vars.insert(
            key.to_string(),
            Variable {
                value: value.to_string(),
                exported: false,
            },
        );
        true
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut env = Environment::empty();
        env.set("FOO", "bar");
        assert_eq!(env.get("FOO"), Some("bar"));
    }

    #[test]
    fn unset_removes() {
        let mut env = Environment::empty();
        env.set("FOO", "bar");
        env.unset("FOO");
        assert_eq!(env.get("FOO"), None);
    }

    #[test]
    fn export_marks_only_named() {
        let mut env = Environment::empty();
        env.set("FOO", "bar");
        env.set("BAZ", "qux");
        env.export("FOO");
        let exported = env.exported_vars();
        assert_eq!(exported, vec![("FOO".to_string(), "bar".to_string())]);
    }

    #[test]
    fn os_environment_is_imported_exported() {
        let env = Environment::new();
        // PATH exists in any reasonable test environment.
        assert!(env.is_exported("PATH"));
    }

    #[test]
    fn local_shadows_and_restores() {
        let mut env = Environment::empty();
        env.set("X", "outer");
        env.push_scope();
        assert!(env.set_local("X", "inner"));
        assert_eq!(env.get("X"), Some("inner"));
        env.pop_scope();
        assert_eq!(env.get("X"), Some("outer"));
    }

    #[test]
    fn local_of_unset_name_is_removed_on_return() {
        let mut env = Environment::empty();
        env.push_scope();
        env.set_local("TMP", "v");
        assert_eq!(env.get("TMP"), Some("v"));
        env.pop_scope();
        assert_eq!(env.get("TMP"), None);
    }

    #[test]
    fn local_outside_function_is_rejected() {
        let mut env = Environment::empty();
        assert!(!env.set_local("X", "v"));
    }
}
