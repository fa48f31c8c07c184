//! Algorithm descriptors and version compatibility.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Names an algorithm family together with a semantic version.
///
/// A descriptor stored in a volume configuration selects the
/// implementation used to open that volume. The `current` number is the
/// implementation's version; `age` says how many prior versions it can
/// still serve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    /// Family name, e.g. `"aes"` or `"nameio/block"`.
    pub family: String,
    /// Current version of the family.
    pub current: u32,
    /// Number of preceding versions this implementation also supports.
    pub age: u32,
}

impl Descriptor {
    /// Creates a descriptor.
    pub fn new(family: impl Into<String>, current: u32, age: u32) -> Self {
        Self {
            family: family.into(),
            current,
            age,
        }
    }

    /// Whether an implementation advertising `self` satisfies a
    /// requirement of `required`.
    ///
    /// True iff the family names match, `self.current >=
    /// required.current`, and the oldest version `self` still serves
    /// (`current - age`) is not newer than the requirement.
    #[must_use]
    pub fn implements(&self, required: &Descriptor) -> bool {
        self.family == required.family
            && self.current >= required.current
            && self.current.saturating_sub(self.age) <= required.current
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.family, self.current, self.age)
    }
}
