//! Ref name validation.
//!
//! Valid ref names:
//! - Must be non-empty and at most 255 bytes
//! - Must not contain whitespace, control characters, `\`, `:`, `*`, `?`
//! - Must not contain `..` (double dot)
//! - Must not start or end with `/`
//! - Components between slashes must be non-empty
//!
//! These rules keep names usable as relative file paths for disk-backed
//! ref registries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &['\\', ':', '*', '?', '"', '<', '>', '|'];

/// Longest accepted ref name, in bytes.
pub const MAX_REF_NAME_LEN: usize = 255;

/// A validated name for a mutable root pointer.
///
/// # Examples
///
/// ```
/// use arbor_types::RefName;
///
/// assert!(RefName::new("logs/job-17/step-2").is_ok());
/// assert!(RefName::new("").is_err());
/// assert!(RefName::new("bad/../name").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Validate and wrap a ref name.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_ref_name(&name)?;
        Ok(Self(name))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validate a ref name, returning `Ok(())` if valid.
pub fn validate_ref_name(name: &str) -> Result<(), TypeError> {
    let reject = |reason: String| TypeError::InvalidRefName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(reject("ref name must not be empty".into()));
    }
    if name.len() > MAX_REF_NAME_LEN {
        return Err(reject(format!("longer than {MAX_REF_NAME_LEN} bytes")));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(reject(format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(reject("must not contain '..'".into()));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(reject("must not start or end with '/'".into()));
    }
    if name.split('/').any(str::is_empty) {
        return Err(reject("path components must not be empty".into()));
    }
    Ok(())
}

impl fmt::Debug for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefName({})", self.0)
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for RefName {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}
