// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Shared identifiers.
//!
//! Stage and dependency identifiers, like workflow states and events, form
//! closed sets registered at config-load time. They are cheap to clone
//! (`Arc<str>`) and borrow as `&str`, so maps keyed by them can be queried
//! with plain string slices.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(value: impl AsRef<str>) -> Self {
                Self(Arc::from(value.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(Arc::from(value))
            }
        }
    };
}

string_id!(
    /// Identifier of a pipeline stage.
    StageId
);

string_id!(
    /// Identifier of a guarded downstream dependency.
    DependencyId
);

string_id!(
    /// Business key of a workflow instance (for example an order number).
    InstanceId
);

string_id!(
    /// A state declared in a workflow table.
    State
);

string_id!(
    /// An event that drives a workflow transition.
    Event
);

/// Unique identifier assigned to every work item at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(Uuid);

impl WorkItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_string_ids_borrow_as_str() {
        let mut map = HashMap::new();
        map.insert(StageId::new("payment"), 3);
        assert_eq!(map.get("payment"), Some(&3));
        assert_eq!(StageId::from("payment").to_string(), "payment");
    }

    #[test]
    fn test_string_ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&vec![InstanceId::new("order-7")]).unwrap();
        assert_eq!(json, r#"["order-7"]"#);

        let state: State = serde_json::from_str(r#""PAID""#).unwrap();
        assert_eq!(state.as_str(), "PAID");
    }

    #[test]
    fn test_work_item_ids_are_unique() {
        assert_ne!(WorkItemId::new(), WorkItemId::new());
    }
}
