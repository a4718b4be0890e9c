use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque condition attached to a tuple
///
/// The reconciler never interprets the context; it only compares the
/// rendered form for tuple categories whose content matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl Condition {
    pub fn new(name: &str, context: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            context,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.context)
    }
}

/// Relationship tuple: user has relation to object, optionally qualified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    pub user: String,
    pub relation: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Tuple {
    pub fn new(user: &str, relation: &str, object: &str) -> Self {
        Self {
            user: user.to_string(),
            relation: relation.to_string(),
            object: object.to_string(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Key identifying this tuple within its object's group
    pub fn key(&self) -> TupleKey {
        TupleKey {
            user: self.user.clone(),
            relation: self.relation.clone(),
        }
    }
}

/// Stable rendering used for content comparison.
impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.user, self.relation, self.object)?;
        if let Some(ref condition) = self.condition {
            write!(f, "[{}]", condition)?;
        }
        Ok(())
    }
}

/// Grouping key of a tuple within one object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TupleKey {
    pub user: String,
    pub relation: String,
}

impl TupleKey {
    pub fn new(user: &str, relation: &str) -> Self {
        Self {
            user: user.to_string(),
            relation: relation.to_string(),
        }
    }
}

impl fmt::Display for TupleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.user, self.relation)
    }
}

/// Delete target. The remote delete ignores conditions, so none is carried.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TupleKeyWithoutCondition {
    pub user: String,
    pub relation: String,
    pub object: String,
}

impl TupleKeyWithoutCondition {
    pub fn new(user: &str, relation: &str, object: &str) -> Self {
        Self {
            user: user.to_string(),
            relation: relation.to_string(),
            object: object.to_string(),
        }
    }
}

impl From<&Tuple> for TupleKeyWithoutCondition {
    fn from(tuple: &Tuple) -> Self {
        Self {
            user: tuple.user.clone(),
            relation: tuple.relation.clone(),
            object: tuple.object.clone(),
        }
    }
}

impl fmt::Display for TupleKeyWithoutCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.user, self.relation, self.object)
    }
}

/// Tuples of a single object, keyed by `(user, relation)`
pub type ObjectTuples = BTreeMap<TupleKey, Tuple>;

/// Tuples grouped by object, then by tuple key
pub type TupleGroup = BTreeMap<String, ObjectTuples>;

/// Build an object's tuple map. Later tuples replace earlier ones with the same key.
pub fn object_tuples<I>(tuples: I) -> ObjectTuples
where
    I: IntoIterator<Item = Tuple>,
{
    tuples.into_iter().map(|t| (t.key(), t)).collect()
}

/// Group a flat list of tuples by their object
pub fn group_tuples<I>(tuples: I) -> TupleGroup
where
    I: IntoIterator<Item = Tuple>,
{
    let mut group = TupleGroup::new();
    for tuple in tuples {
        group
            .entry(tuple.object.clone())
            .or_default()
            .insert(tuple.key(), tuple);
    }
    group
}

/// Flatten a group back into a list, in object then key order
pub fn flatten_group(group: &TupleGroup) -> Vec<Tuple> {
    group
        .values()
        .flat_map(|tuples| tuples.values().cloned())
        .collect()
}

/// Mutations accumulated over one reconciliation pass
///
/// Each list holds a given `(user, relation, object)` at most once. A key that
/// sits in both lists is a single update: the old edge is deleted, then the
/// new content is written.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeSet {
    pub writes: Vec<Tuple>,
    pub deletes: Vec<TupleKeyWithoutCondition>,
    #[serde(skip)]
    queued_writes: AHashSet<TupleKeyWithoutCondition>,
    #[serde(skip)]
    queued_deletes: AHashSet<TupleKeyWithoutCondition>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a write. Returns false when the key was already queued.
    pub fn push_write(&mut self, tuple: Tuple) -> bool {
        if !self.queued_writes.insert(TupleKeyWithoutCondition::from(&tuple)) {
            return false;
        }
        self.writes.push(tuple);
        true
    }

    /// Queue a delete. Returns false when the key was already queued.
    pub fn push_delete(&mut self, key: TupleKeyWithoutCondition) -> bool {
        if !self.queued_deletes.insert(key.clone()) {
            return false;
        }
        self.deletes.push(key);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.deletes.is_empty()
    }

    /// Total number of queued mutations
    pub fn len(&self) -> usize {
        self.writes.len().saturating_add(self.deletes.len())
    }
}
