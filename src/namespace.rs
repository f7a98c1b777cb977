//! Namespace Module
//!
//! Composes effective keys from (namespace, key) and tracks the namespace
//! scope active on the current thread. A scope is an RAII guard, so the
//! prior namespace is restored even on unwind.

use std::cell::RefCell;

use crate::error::{CacheError, Result};

/// Separator between a namespace and the raw key inside an effective key.
pub const NAMESPACE_DELIMITER: char = ':';

thread_local! {
    static SCOPES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

// == Validation ==
/// A namespace must be non-empty and must not contain the delimiter.
pub fn validate(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(CacheError::EmptyNamespace);
    }
    if namespace.contains(NAMESPACE_DELIMITER) {
        return Err(CacheError::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}

// == Scope Guard ==
/// Thread-local namespace scope. Operations without an explicit namespace
/// pick up the innermost active scope.
pub struct NamespaceScope {
    _private: (),
}

impl NamespaceScope {
    /// Pushes `namespace` as the active scope for this thread.
    pub fn enter(namespace: &str) -> Result<Self> {
        validate(namespace)?;
        SCOPES.with(|scopes| scopes.borrow_mut().push(namespace.to_string()));
        Ok(Self { _private: () })
    }
}

impl Drop for NamespaceScope {
    fn drop(&mut self) {
        SCOPES.with(|scopes| {
            scopes.borrow_mut().pop();
        });
    }
}

/// Runs `f` with `namespace` active on the current thread.
pub fn with_namespace<R>(namespace: &str, f: impl FnOnce() -> R) -> Result<R> {
    let _scope = NamespaceScope::enter(namespace)?;
    Ok(f())
}

/// The innermost namespace scope active on this thread, if any.
pub fn current_namespace() -> Option<String> {
    SCOPES.with(|scopes| scopes.borrow().last().cloned())
}

// == Resolution ==
/// Resolves an operation's effective key and the namespace it is charged
/// to: the explicit namespace wins, else the active scope, else none.
pub fn resolve(key: &str, explicit: Option<&str>) -> Result<(String, Option<String>)> {
    let namespace = match explicit {
        Some(ns) => {
            validate(ns)?;
            Some(ns.to_string())
        }
        None => current_namespace(),
    };
    let effective = match &namespace {
        Some(ns) => format!("{}{}{}", ns, NAMESPACE_DELIMITER, key),
        None => key.to_string(),
    };
    Ok((effective, namespace))
}

/// The effective-key prefix covering every key in `namespace`.
pub fn prefix(namespace: &str) -> String {
    format!("{}{}", namespace, NAMESPACE_DELIMITER)
}
