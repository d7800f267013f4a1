//! Field exclusion filter
//!
//! Excluded fields are still extracted (their presence decides scope and
//! bucket placement) but their values are blanked, and the formatter leaves
//! them out of serialized output.

use std::collections::HashSet;
use uuid::{uuid, Uuid};

/// Bookkeeping fields that must not travel between environments
///
/// - `Last run` on the schedule template (task registration)
/// - `__Owner`
/// - `__Originator`
/// - `__Updated`
/// - `__Updated by`
/// - `__Lock`
pub const DEFAULT_EXCLUDED_FIELDS: [Uuid; 6] = [
    uuid!("b1e16562-f3f9-4ddd-84ca-6e099950ecc0"),
    uuid!("52807595-0f8f-4b20-8d2a-cb71d28c6103"),
    uuid!("f6d8a61c-2f84-4401-bd24-52d2068172bc"),
    uuid!("d9cf14b1-fa16-4ba6-9288-e8a174d4d522"),
    uuid!("badd9cf9-53e0-4d0c-bcc0-2d784c282f6a"),
    uuid!("001dd393-96c5-490b-924a-b0f25cd9efd8"),
];

/// Set of field identifiers whose values are excluded from transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    excludes: HashSet<Uuid>,
}

impl FieldFilter {
    /// A filter that excludes nothing
    pub fn empty() -> Self {
        Self {
            excludes: HashSet::new(),
        }
    }

    pub fn with_excludes(excludes: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            excludes: excludes.into_iter().collect(),
        }
    }

    pub fn excludes(&self) -> &HashSet<Uuid> {
        &self.excludes
    }

    pub fn exclude(&mut self, field_id: Uuid) {
        self.excludes.insert(field_id);
    }

    pub fn is_excluded(&self, field_id: &Uuid) -> bool {
        self.excludes.contains(field_id)
    }

    /// Excluded ids in a stable order, for building bind lists
    pub fn sorted_excludes(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.excludes.iter().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for FieldFilter {
    fn default() -> Self {
        Self::with_excludes(DEFAULT_EXCLUDED_FIELDS)
    }
}
