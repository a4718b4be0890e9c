//! Content-aware comparison rules
//!
//! Tuples are matched by `(user, relation)` within an object. For most
//! relations that is the whole story, but some tuple categories embed derived
//! state in their condition and must be rewritten when that state drifts.
//! Each such category is a [`ContentRule`].

use crate::models::{Condition, Tuple};
use serde_json::json;
use std::sync::Arc;

pub const FOLDER_OBJECT_PREFIX: &str = "folder:";
pub const FOLDER_RESOURCE_RELATION_PREFIX: &str = "resource_";
pub const FOLDER_GROUP_FILTER_CONDITION: &str = "folder_group_filter";
pub const GROUP_RESOURCES_KEY: &str = "group_resources";

/// A tuple category whose content, not just its key, must match remotely
pub trait ContentRule: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the tuple belongs to this category
    fn applies(&self, tuple: &Tuple) -> bool;

    /// Whether the remote copy has to be replaced by the legacy one
    fn differs(&self, legacy: &Tuple, remote: &Tuple) -> bool {
        legacy.to_string() != remote.to_string()
    }
}

/// Folder resource tuples carry the set of group resources they grant on the
/// folder's descendants inside their condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct FolderResourceRule;

impl FolderResourceRule {
    pub fn is_folder_resource_tuple(tuple: &Tuple) -> bool {
        tuple.object.starts_with(FOLDER_OBJECT_PREFIX)
            && tuple.relation.starts_with(FOLDER_RESOURCE_RELATION_PREFIX)
    }
}

impl ContentRule for FolderResourceRule {
    fn name(&self) -> &str {
        "folder_resource"
    }

    fn applies(&self, tuple: &Tuple) -> bool {
        Self::is_folder_resource_tuple(tuple)
    }
}

/// Ordered set of content rules; the first rule that applies decides
#[derive(Clone)]
pub struct ContentRules {
    rules: Vec<Arc<dyn ContentRule>>,
}

impl ContentRules {
    /// No content rules: every tuple is matched by key only
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: Arc<dyn ContentRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule responsible for this tuple, if any
    pub fn rule_for(&self, tuple: &Tuple) -> Option<&dyn ContentRule> {
        self.rules
            .iter()
            .find(|rule| rule.applies(tuple))
            .map(|rule| rule.as_ref())
    }

    /// True when a key match still needs a delete followed by a write
    pub fn requires_rewrite(&self, legacy: &Tuple, remote: &Tuple) -> bool {
        self.rule_for(legacy)
            .is_some_and(|rule| rule.differs(legacy, remote))
    }
}

impl Default for ContentRules {
    fn default() -> Self {
        Self::none().with_rule(Arc::new(FolderResourceRule))
    }
}

impl std::fmt::Debug for ContentRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.name()))
            .finish()
    }
}

/// Build a folder resource tuple granting `relation` over `group_resources`
/// inside `folder` (the folder uid, without type prefix).
pub fn folder_resource_tuple(
    user: &str,
    relation: &str,
    folder: &str,
    group_resources: &[&str],
) -> Tuple {
    Tuple::new(user, relation, &format!("{}{}", FOLDER_OBJECT_PREFIX, folder)).with_condition(
        Condition::new(
            FOLDER_GROUP_FILTER_CONDITION,
            json!({ GROUP_RESOURCES_KEY: group_resources }),
        ),
    )
}
