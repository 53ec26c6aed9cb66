use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! key_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

key_newtype!(TypeKey);
key_newtype!(FieldKey);
key_newtype!(FilePath);
key_newtype!(SectionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Date,
    Year,
}

/// One input of an entry-type schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub key: FieldKey,
    pub label: String,
    #[serde(default, rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub placeholder: String,
}

/// Schema of one bibliographic source category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryTypeSpec {
    pub label: String,
    pub icon: String,
    pub fields: Vec<Field>,
}

/// Catalog of all known entry types, loaded once per session.
pub type EntryTypeCatalog = BTreeMap<TypeKey, EntryTypeSpec>;

/// One saved entry as reported by the backend library listing. Fields the
/// backend could not parse out of the stored file arrive blank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryFile {
    pub path: FilePath,
    pub name: String,
    #[serde(default)]
    pub key: String,
    #[serde(default, rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub journal: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub isbn: String,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub size: u64,
}
