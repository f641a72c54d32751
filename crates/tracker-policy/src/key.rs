// key.rs — Identity of a property for policy lookups.

use std::fmt;

use serde::{Deserialize, Serialize};

/// `(property name, owning entity type)` — the lookup key for
/// property-level overrides. Two keys are equal only when both parts match,
/// so `Name` on `shop::Order` and `Name` on `shop::Customer` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyTrackingKey {
    pub property_name: String,
    pub entity_type: String,
}

impl PropertyTrackingKey {
    pub fn new(property_name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            entity_type: entity_type.into(),
        }
    }
}

impl fmt::Display for PropertyTrackingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity_type, self.property_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn same_property_on_different_types_is_distinct() {
        let a = PropertyTrackingKey::new("Name", "shop::Order");
        let b = PropertyTrackingKey::new("Name", "shop::Customer");
        let mut set = HashSet::new();
        set.insert(a.clone());
        set.insert(b);
        set.insert(a);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn display_is_qualified() {
        let key = PropertyTrackingKey::new("Name", "shop::Order");
        assert_eq!(key.to_string(), "shop::Order.Name");
    }
}
