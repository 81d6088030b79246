// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes for tasks and traces.

/// Trait for truncating identifiers to a short prefix.
pub trait ShortId {
    /// Returns a string slice truncated to at most `n` characters.
    fn short(&self, n: usize) -> &str;
}

impl ShortId for str {
    fn short(&self, n: usize) -> &str {
        if self.len() <= n {
            self
        } else {
            &self[..n]
        }
    }
}

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `Display`, `From<String>`, `From<&str>`,
/// and `PartialEq<&str>` implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

crate::define_id! {
    /// Unique identifier for a task.
    ///
    /// Carries the pool name (and, when known at submission, the likely
    /// instance) as a prefix so a task can be placed at a glance in logs
    /// and on disk.
    #[derive(Default)]
    pub struct TaskId;
}

impl TaskId {
    /// Generate a fresh task id prefixed with the pool and an optional
    /// instance hint.
    pub fn generate(pool: &str, instance_hint: Option<&str>) -> Self {
        let entropy = uuid::Uuid::new_v4().simple().to_string();
        let tail = entropy.short(12);
        match instance_hint {
            Some(hint) => Self(format!("{pool}-{hint}-{tail}")),
            None => Self(format!("{pool}-{tail}")),
        }
    }
}

crate::define_id! {
    /// Correlation id propagated across every log line of one task.
    #[derive(Default)]
    pub struct TraceId;
}

impl TraceId {
    /// Generate a fresh trace id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
