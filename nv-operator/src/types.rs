use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

id_newtype!(SessionId);

impl SessionId {
    /// Short random id; used in record file names and log fields.
    pub fn generate() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(12);
        Self(id)
    }
}

/// A human's answer to a permission question, as typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionAnswer {
    raw: String,
    automatic: bool,
}

impl PermissionAnswer {
    /// Normalizes to trimmed lowercase, the form recorded in the transcript.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self {
            raw: raw.as_ref().trim().to_lowercase(),
            automatic: false,
        }
    }

    /// Granted without asking anyone.
    pub fn automatic() -> Self {
        Self {
            raw: "(auto-approved) yes".to_string(),
            automatic: true,
        }
    }

    /// Empty answer given when the input stream has ended.
    pub fn no_answer() -> Self {
        Self::new("")
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic
    }

    /// Only an explicit "yes" grants.
    pub fn approved(&self) -> bool {
        self.automatic || self.raw == "yes"
    }
}
