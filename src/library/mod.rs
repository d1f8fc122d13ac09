//! Fragment library data model.
//!
//! A [`FragmentLibrary`] is an ordered, immutable set of
//! [`FragmentCollection`]s. It is validated once at construction so that the
//! composition pipeline never has to deal with configuration defects at run
//! time.
//!
//! # On-disk format
//!
//! ```json
//! {
//!   "Pose": {
//!     "prompts": ["sitting", "standing"],
//!     "use_min_prompts": 1,
//!     "use_max_prompts": 1,
//!     "position": "start"
//!   },
//!   "Accessory": {
//!     "prompts": ["holding a sword"],
//!     "use_min_prompts": 0,
//!     "use_max_prompts": 1,
//!     "condition": { "depends_on": "Pose", "must_contain_any": ["standing"] }
//!   }
//! }
//! ```
//!
//! Object key order is the declaration order and is preserved all the way
//! through placement.

pub mod loader;

pub use loader::{LibraryFile, LibraryLocator, PromptSet, TierPath};

use crate::error::{LoomError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// Placement and Condition
// ============================================================================

/// Where a collection's fragments land in the assembled prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Untagged: placed between `start` and `end` fragments.
    #[default]
    None,
    /// Must appear before all untagged fragments.
    Start,
    /// Must appear after all untagged fragments.
    End,
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Start => write!(f, "start"),
            Self::End => write!(f, "end"),
        }
    }
}

/// Activation rule for a second-pass collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Name of the unconditional collection whose selection is inspected.
    pub depends_on: String,
    /// The collection activates if any selected fragment of `depends_on`
    /// contains any of these strings.
    #[serde(default)]
    pub must_contain_any: Vec<String>,
}

impl Condition {
    /// Create a new condition.
    pub fn new<I, S>(depends_on: impl Into<String>, must_contain_any: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            depends_on: depends_on.into(),
            must_contain_any: must_contain_any.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether any of the given selected fragments satisfies this condition.
    #[must_use]
    pub fn is_satisfied_by(&self, selected: &[String]) -> bool {
        selected.iter().any(|fragment| {
            self.must_contain_any
                .iter()
                .any(|needle| fragment.contains(needle.as_str()))
        })
    }
}

// ============================================================================
// Fragment Collection
// ============================================================================

/// A named group of candidate fragments with a selection-count range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentCollection {
    /// Collection name (the JSON key).
    pub name: String,
    /// Candidate fragments in declaration order.
    pub fragments: Vec<String>,
    /// Minimum number of fragments to select.
    pub min_count: usize,
    /// Maximum number of fragments to select. May exceed `fragments.len()`.
    pub max_count: usize,
    /// Placement tag.
    pub placement: Placement,
    /// Optional second-pass activation rule.
    pub condition: Option<Condition>,
}

impl FragmentCollection {
    /// Create an unconditional, untagged collection.
    pub fn new<I, S>(name: impl Into<String>, fragments: I, min_count: usize, max_count: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fragments: fragments.into_iter().map(Into::into).collect(),
            min_count,
            max_count,
            placement: Placement::None,
            condition: None,
        }
    }

    /// Set the placement tag.
    #[must_use]
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Attach a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Whether this collection is evaluated in the second pass.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }

    /// Check `min_count <= max_count`.
    ///
    /// # Errors
    ///
    /// Returns [`LoomError::InvalidRange`] when the range is inverted.
    pub fn validate_range(&self) -> Result<()> {
        if self.min_count > self.max_count {
            return Err(LoomError::InvalidRange {
                collection: self.name.clone(),
                min: self.min_count,
                max: self.max_count,
            });
        }
        Ok(())
    }
}

/// JSON shape of one collection entry.
#[derive(Debug, Deserialize)]
struct RawCollection {
    #[serde(default)]
    prompts: Vec<String>,
    #[serde(default, alias = "use min prompts")]
    use_min_prompts: usize,
    #[serde(default, alias = "use max prompts")]
    use_max_prompts: usize,
    #[serde(default)]
    position: Option<Placement>,
    #[serde(default)]
    condition: Option<Condition>,
}

impl RawCollection {
    fn into_collection(self, name: String) -> FragmentCollection {
        FragmentCollection {
            name,
            fragments: self.prompts,
            min_count: self.use_min_prompts,
            max_count: self.use_max_prompts,
            placement: self.position.unwrap_or_default(),
            condition: self.condition,
        }
    }
}

/// Parse the collections of one library file, in declaration order.
///
/// Entries whose value is not a JSON object are skipped.
///
/// # Errors
///
/// Returns a JSON error if the document is not an object or an entry is
/// malformed.
pub fn parse_collections(json: &str) -> Result<Vec<FragmentCollection>> {
    let entries: IndexMap<String, serde_json::Value> = serde_json::from_str(json)?;
    let mut collections = Vec::with_capacity(entries.len());
    for (name, value) in entries {
        if !value.is_object() {
            tracing::debug!("Skipping non-collection entry '{}'", name);
            continue;
        }
        let raw: RawCollection = serde_json::from_value(value)?;
        collections.push(raw.into_collection(name));
    }
    Ok(collections)
}

/// Read the collections of one library file.
///
/// # Errors
///
/// Returns an IO error if the file cannot be read, or a configuration error
/// carrying the path if it cannot be parsed.
pub fn read_collections(path: &Path) -> Result<Vec<FragmentCollection>> {
    let content = std::fs::read_to_string(path)?;
    parse_collections(&content).map_err(|e| {
        LoomError::config_with_path(format!("{}: {}", path.display(), e), path.to_path_buf())
    })
}

// ============================================================================
// Fragment Library
// ============================================================================

/// Validated, immutable set of collections in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentLibrary {
    collections: IndexMap<String, FragmentCollection>,
}

impl FragmentLibrary {
    /// Build and validate a library.
    ///
    /// # Errors
    ///
    /// - [`LoomError::InvalidRange`] if any collection has `min > max`
    /// - [`LoomError::UnknownDependency`] if a condition names a missing collection
    /// - [`LoomError::ConditionalDependency`] if a condition names a conditional collection
    /// - [`LoomError::InvalidConfig`] on duplicate collection names
    pub fn new(collections: Vec<FragmentCollection>) -> Result<Self> {
        let mut map = IndexMap::with_capacity(collections.len());
        for collection in collections {
            collection.validate_range()?;
            if map.contains_key(&collection.name) {
                return Err(LoomError::invalid_config(
                    collection.name.clone(),
                    "collection declared more than once",
                ));
            }
            map.insert(collection.name.clone(), collection);
        }

        for collection in map.values() {
            let Some(condition) = &collection.condition else {
                continue;
            };
            match map.get(&condition.depends_on) {
                None => {
                    return Err(LoomError::UnknownDependency {
                        collection: collection.name.clone(),
                        depends_on: condition.depends_on.clone(),
                    })
                }
                Some(target) if target.is_conditional() => {
                    return Err(LoomError::ConditionalDependency {
                        collection: collection.name.clone(),
                        depends_on: condition.depends_on.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        Ok(Self { collections: map })
    }

    /// An empty library.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse and validate a library from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns JSON or validation errors.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(parse_collections(json)?)
    }

    /// Look up a collection by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FragmentCollection> {
        self.collections.get(name)
    }

    /// Iterate collections in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &FragmentCollection> {
        self.collections.values()
    }

    /// Collection names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Number of collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Whether the library has no collections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Total number of candidate fragments across all collections.
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.collections.values().map(|c| c.fragments.len()).sum()
    }
}

// ============================================================================
// Cancel Pair Table
// ============================================================================

/// Trigger fragment to incompatible fragments, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CancelPairTable {
    pairs: IndexMap<String, Vec<String>>,
}

impl CancelPairTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trigger with its removal list.
    #[must_use]
    pub fn with_pair<I, S>(mut self, trigger: impl Into<String>, removals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pairs
            .entry(trigger.into())
            .or_default()
            .extend(removals.into_iter().map(Into::into));
        self
    }

    /// Parse a cancel-pair document.
    ///
    /// Values that are not arrays of strings are skipped.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the document is not an object.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: IndexMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut pairs = IndexMap::with_capacity(entries.len());
        for (trigger, value) in entries {
            match value {
                serde_json::Value::Array(items) => {
                    let removals: Vec<String> = items
                        .into_iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect();
                    pairs.insert(trigger, removals);
                }
                _ => tracing::debug!("Skipping non-list cancel pair '{}'", trigger),
            }
        }
        Ok(Self { pairs })
    }

    /// Iterate `(trigger, removals)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of triggers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the table has no triggers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Pose": {
            "prompts": ["sitting", "standing"],
            "use_min_prompts": 1,
            "use_max_prompts": 1,
            "position": "start"
        },
        "Background": {
            "prompts": ["in a park"],
            "use min prompts": 0,
            "use max prompts": 2
        },
        "Accessory": {
            "prompts": ["holding a sword"],
            "use_max_prompts": 1,
            "condition": { "depends_on": "Pose", "must_contain_any": ["standing"] }
        },
        "comment": "not a collection"
    }"#;

    #[test]
    fn test_parse_preserves_declaration_order() {
        let lib = FragmentLibrary::from_json(SAMPLE).unwrap();
        let names: Vec<_> = lib.names().collect();
        assert_eq!(names, vec!["Pose", "Background", "Accessory"]);
    }

    #[test]
    fn test_parse_fields_and_aliases() {
        let lib = FragmentLibrary::from_json(SAMPLE).unwrap();

        let pose = lib.get("Pose").unwrap();
        assert_eq!(pose.placement, Placement::Start);
        assert_eq!(pose.min_count, 1);

        let background = lib.get("Background").unwrap();
        assert_eq!(background.max_count, 2);
        assert_eq!(background.placement, Placement::None);

        let accessory = lib.get("Accessory").unwrap();
        assert_eq!(accessory.min_count, 0);
        assert_eq!(
            accessory.condition,
            Some(Condition::new("Pose", ["standing"]))
        );
    }

    #[test]
    fn test_inverted_range_is_fatal() {
        let result = FragmentLibrary::new(vec![FragmentCollection::new("Bad", ["a"], 2, 1)]);
        assert!(matches!(result, Err(LoomError::InvalidRange { .. })));
    }

    #[test]
    fn test_unknown_dependency_is_fatal() {
        let result = FragmentLibrary::new(vec![FragmentCollection::new("Acc", ["x"], 0, 1)
            .with_condition(Condition::new("Missing", ["y"]))]);
        match result {
            Err(LoomError::UnknownDependency {
                collection,
                depends_on,
            }) => {
                assert_eq!(collection, "Acc");
                assert_eq!(depends_on, "Missing");
            }
            other => panic!("expected UnknownDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_dependency_on_conditional_is_fatal() {
        let result = FragmentLibrary::new(vec![
            FragmentCollection::new("Base", ["a"], 1, 1),
            FragmentCollection::new("First", ["b"], 1, 1)
                .with_condition(Condition::new("Base", ["a"])),
            FragmentCollection::new("Second", ["c"], 1, 1)
                .with_condition(Condition::new("First", ["b"])),
        ]);
        assert!(matches!(
            result,
            Err(LoomError::ConditionalDependency { .. })
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = FragmentLibrary::new(vec![
            FragmentCollection::new("A", ["a"], 1, 1),
            FragmentCollection::new("A", ["b"], 1, 1),
        ]);
        assert!(matches!(result, Err(LoomError::InvalidConfig { .. })));
    }

    #[test]
    fn test_cross_file_conditions_validate_once_concatenated() {
        let optional_json = r#"{"Prop": {"prompts": ["cane"], "use_max_prompts": 1,
            "condition": {"depends_on": "Pose", "must_contain_any": ["standing"]}}}"#;
        // Alone, the optional file references an unknown collection.
        assert!(FragmentLibrary::from_json(optional_json).is_err());

        let mut all = vec![FragmentCollection::new("Pose", ["standing"], 1, 1)];
        all.extend(parse_collections(optional_json).unwrap());
        let merged = FragmentLibrary::new(all).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.fragment_count(), 2);
    }

    #[test]
    fn test_condition_satisfaction_is_substring() {
        let cond = Condition::new("Base", ["dragon"]);
        assert!(cond.is_satisfied_by(&["(red dragon:1.2)".to_string()]));
        assert!(!cond.is_satisfied_by(&["knight".to_string()]));
        assert!(!cond.is_satisfied_by(&[]));
    }

    #[test]
    fn test_cancel_pair_table_from_json() {
        let table = CancelPairTable::from_json(
            r#"{"selfie": ["looking at viewer", "from behind"], "Pairs": [], "note": 3}"#,
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        let (trigger, removals) = table.iter().next().unwrap();
        assert_eq!(trigger, "selfie");
        assert_eq!(removals.len(), 2);
    }

    #[test]
    fn test_placement_display() {
        assert_eq!(Placement::Start.to_string(), "start");
        assert_eq!(Placement::default().to_string(), "none");
    }
}
