use serde::{Deserialize, Serialize};

/// Role of a caller relative to one ledger.
///
/// `Owner` satisfies every requirement; `Any` is held by every identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Any,
}

impl Role {
    /// Whether a caller holding `self` satisfies a `required` role.
    pub fn satisfies(self, required: Role) -> bool {
        match required {
            Role::Any => true,
            Role::Owner => self == Role::Owner,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Any => "any",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
