//! Content tree records
//!
//! A [`Node`] is one item of the content tree together with its field values,
//! partitioned the same way the store partitions them: shared values,
//! per-language values, and per-language-and-version values.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version number reported for shared and unversioned field rows
pub const UNVERSIONED: i64 = -1;

/// One item of the content tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    /// Full path built from ancestor names, e.g. `/content/home/about`
    pub path: String,
    pub branch_id: Uuid,
    /// Logical store the node was read from
    pub database: String,
    #[serde(default)]
    pub shared_fields: Vec<FieldValue>,
    #[serde(default)]
    pub unversioned_fields: Vec<LanguageFields>,
    #[serde(default)]
    pub versions: Vec<VersionFields>,
}

impl Node {
    /// Create a node with empty field buckets
    pub fn new(
        id: Uuid,
        parent_id: Uuid,
        template_id: Uuid,
        name: impl Into<String>,
        path: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id,
            template_id,
            name: name.into(),
            path: path.into(),
            branch_id: Uuid::nil(),
            database: database.into(),
            shared_fields: Vec::new(),
            unversioned_fields: Vec::new(),
            versions: Vec::new(),
        }
    }

    /// Bucket for `language`, created on first use
    pub fn language_bucket(&mut self, language: &str) -> &mut LanguageFields {
        let index = match self
            .unversioned_fields
            .iter()
            .position(|bucket| bucket.language == language)
        {
            Some(index) => index,
            None => {
                self.unversioned_fields.push(LanguageFields::new(language));
                self.unversioned_fields.len() - 1
            }
        };

        &mut self.unversioned_fields[index]
    }

    /// Bucket for (`language`, `version`), created on first use
    pub fn version_bucket(&mut self, language: &str, version: i64) -> &mut VersionFields {
        let index = match self
            .versions
            .iter()
            .position(|bucket| bucket.language == language && bucket.version == version)
        {
            Some(index) => index,
            None => {
                self.versions.push(VersionFields::new(language, version));
                self.versions.len() - 1
            }
        };

        &mut self.versions[index]
    }

    /// Every field value on the node regardless of bucket
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldValue> {
        self.shared_fields
            .iter()
            .chain(self.unversioned_fields.iter().flat_map(|b| b.fields.iter()))
            .chain(self.versions.iter().flat_map(|b| b.fields.iter()))
    }

    pub fn field_count(&self) -> usize {
        self.all_fields().count()
    }
}

/// A single stored field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub field_id: Uuid,
    pub value: String,
    /// Empty for shared values
    #[serde(default)]
    pub language: String,
    /// [`UNVERSIONED`] for shared and unversioned values
    #[serde(default = "unversioned")]
    pub version: i64,
    /// Blob reference parsed from the value of blob-typed fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
}

fn unversioned() -> i64 {
    UNVERSIONED
}

impl FieldValue {
    pub fn new(field_id: Uuid, value: impl Into<String>, language: impl Into<String>, version: i64) -> Self {
        Self {
            field_id,
            value: value.into(),
            language: language.into(),
            version,
            blob_id: None,
            name_hint: None,
            field_type: None,
        }
    }
}

/// Unversioned values for one language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageFields {
    pub language: String,
    pub fields: Vec<FieldValue>,
}

impl LanguageFields {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            fields: Vec::new(),
        }
    }
}

/// Versioned values for one language and version number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionFields {
    pub language: String,
    pub version: i64,
    pub fields: Vec<FieldValue>,
}

impl VersionFields {
    pub fn new(language: impl Into<String>, version: i64) -> Self {
        Self {
            language: language.into(),
            version,
            fields: Vec::new(),
        }
    }
}

/// Declared storage scope of a template field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldScope {
    /// No language, no version
    Shared,
    /// One value per language
    Unversioned,
    /// One value per language and version
    Versioned,
}

impl FieldScope {
    /// Whether a row with this `language` and `version` belongs to this scope
    pub fn accepts(&self, language: &str, version: i64) -> bool {
        match self {
            FieldScope::Shared => version < 1 && language.is_empty(),
            FieldScope::Unversioned => version < 1 && !language.is_empty(),
            FieldScope::Versioned => version >= 1 && !language.is_empty(),
        }
    }

    /// The field table a row with this shape was read from
    pub fn table_of(language: &str, version: i64) -> &'static str {
        if version >= 1 {
            "versioned"
        } else if language.is_empty() {
            "shared"
        } else {
            "unversioned"
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldScope::Shared => "shared",
            FieldScope::Unversioned => "unversioned",
            FieldScope::Versioned => "versioned",
        }
    }
}

impl std::fmt::Display for FieldScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template metadata for one field of one template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
    pub name: String,
    pub field_type: String,
    pub scope: FieldScope,
    #[serde(default)]
    pub is_blob: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node::new(Uuid::new_v4(), Uuid::nil(), Uuid::new_v4(), "home", "/home", "master")
    }

    #[test]
    fn test_scope_predicates() {
        assert!(FieldScope::Shared.accepts("", UNVERSIONED));
        assert!(!FieldScope::Shared.accepts("en", UNVERSIONED));
        assert!(!FieldScope::Shared.accepts("", 1));

        assert!(FieldScope::Unversioned.accepts("en", UNVERSIONED));
        assert!(!FieldScope::Unversioned.accepts("", UNVERSIONED));
        assert!(!FieldScope::Unversioned.accepts("en", 2));

        assert!(FieldScope::Versioned.accepts("en", 1));
        assert!(!FieldScope::Versioned.accepts("en", UNVERSIONED));
        assert!(!FieldScope::Versioned.accepts("", 3));
    }

    #[test]
    fn test_table_of_row_shape() {
        assert_eq!(FieldScope::table_of("", UNVERSIONED), "shared");
        assert_eq!(FieldScope::table_of("da", UNVERSIONED), "unversioned");
        assert_eq!(FieldScope::table_of("da", 4), "versioned");
    }

    #[test]
    fn test_language_bucket_reused() {
        let mut node = node();
        let field = Uuid::new_v4();

        node.language_bucket("en").fields.push(FieldValue::new(field, "a", "en", UNVERSIONED));
        node.language_bucket("en").fields.push(FieldValue::new(field, "b", "en", UNVERSIONED));
        node.language_bucket("de").fields.push(FieldValue::new(field, "c", "de", UNVERSIONED));

        assert_eq!(node.unversioned_fields.len(), 2);
        assert_eq!(node.unversioned_fields[0].fields.len(), 2);
    }

    #[test]
    fn test_language_match_is_ordinal() {
        let mut node = node();
        node.language_bucket("en-US");
        node.language_bucket("en-us");

        assert_eq!(node.unversioned_fields.len(), 2);
    }

    #[test]
    fn test_version_bucket_keyed_by_language_and_version() {
        let mut node = node();
        node.version_bucket("en", 1);
        node.version_bucket("en", 2);
        node.version_bucket("en", 1);
        node.version_bucket("da", 1);

        assert_eq!(node.versions.len(), 3);
    }

    #[test]
    fn test_field_count_spans_buckets() {
        let mut node = node();
        let field = Uuid::new_v4();
        node.shared_fields.push(FieldValue::new(field, "s", "", UNVERSIONED));
        node.language_bucket("en").fields.push(FieldValue::new(field, "u", "en", UNVERSIONED));
        node.version_bucket("en", 1).fields.push(FieldValue::new(field, "v", "en", 1));

        assert_eq!(node.field_count(), 3);
    }
}
