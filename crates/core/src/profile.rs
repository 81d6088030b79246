// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema profiles: named projections of vulnerability fields.

use thiserror::Error;

/// Which fields of each vulnerability a results read emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaProfile {
    Minimal,
    Summary,
    /// The default profile.
    Brief,
    Full,
    /// Caller-supplied explicit field list.
    Custom(Vec<String>),
}

/// Invalid profile selection in a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("unknown schema profile: {0}")]
    Unknown(String),
    #[error("custom_fields cannot be combined with profile '{0}'")]
    ConflictsWithProfile(String),
    #[error("custom_fields must not be empty")]
    EmptyCustom,
}

impl SchemaProfile {
    /// Resolve the profile / custom-fields pair from a request.
    ///
    /// `custom_fields` excludes every named profile except the default,
    /// which it overrides.
    pub fn resolve(
        profile: Option<&str>,
        custom_fields: Option<&[String]>,
    ) -> Result<Self, ProfileError> {
        match (profile, custom_fields) {
            (_, Some([])) => Err(ProfileError::EmptyCustom),
            (None, None) => Ok(SchemaProfile::Brief),
            (None, Some(fields)) => Ok(SchemaProfile::Custom(fields.to_vec())),
            (Some(name), None) => Self::parse(name),
            (Some(name), Some(fields)) => match Self::parse(name)? {
                SchemaProfile::Brief => Ok(SchemaProfile::Custom(fields.to_vec())),
                _ => Err(ProfileError::ConflictsWithProfile(name.to_string())),
            },
        }
    }

    fn parse(name: &str) -> Result<Self, ProfileError> {
        match name {
            "minimal" => Ok(SchemaProfile::Minimal),
            "summary" => Ok(SchemaProfile::Summary),
            "brief" => Ok(SchemaProfile::Brief),
            "full" => Ok(SchemaProfile::Full),
            other => Err(ProfileError::Unknown(other.to_string())),
        }
    }

    /// Profile name as emitted in the schema line.
    pub fn name(&self) -> &'static str {
        match self {
            SchemaProfile::Minimal => "minimal",
            SchemaProfile::Summary => "summary",
            SchemaProfile::Brief => "brief",
            SchemaProfile::Full => "full",
            SchemaProfile::Custom(_) => "custom",
        }
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
