//! Tenant namespace parsing
//!
//! Namespaces follow the claims format used by the API server:
//! - `default` is organization 1
//! - `org-<id>` is organization `<id>` (`org-1` must be spelled `default`)
//! - `stacks-<id>` is a cloud stack, always organization 1

use crate::error::{ReconcileError, Result};
use std::fmt;

const DEFAULT_NAMESPACE: &str = "default";
const ORG_PREFIX: &str = "org-";
const STACK_PREFIX: &str = "stacks-";

/// Tenant information encoded in a namespace string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub value: String,
    pub org_id: i64,
    pub stack_id: Option<i64>,
}

impl NamespaceInfo {
    pub fn parse(namespace: &str) -> Result<Self> {
        if namespace == DEFAULT_NAMESPACE {
            return Ok(Self {
                value: namespace.to_string(),
                org_id: 1,
                stack_id: None,
            });
        }

        if let Some(raw) = namespace.strip_prefix(ORG_PREFIX) {
            let org_id = parse_id(namespace, raw, "organization")?;
            if org_id == 1 {
                return Err(ReconcileError::invalid_namespace(
                    namespace,
                    "organization 1 must use the default namespace",
                ));
            }
            return Ok(Self {
                value: namespace.to_string(),
                org_id,
                stack_id: None,
            });
        }

        if let Some(raw) = namespace.strip_prefix(STACK_PREFIX) {
            let stack_id = parse_id(namespace, raw, "stack")?;
            return Ok(Self {
                value: namespace.to_string(),
                org_id: 1,
                stack_id: Some(stack_id),
            });
        }

        Err(ReconcileError::invalid_namespace(
            namespace,
            "expected default, org-<id> or stacks-<id>",
        ))
    }
}

impl fmt::Display for NamespaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

fn parse_id(namespace: &str, raw: &str, kind: &str) -> Result<i64> {
    let id: i64 = raw
        .parse()
        .map_err(|_| {
            ReconcileError::invalid_namespace(namespace, format!("invalid {} id {:?}", kind, raw))
        })?;
    if id < 1 {
        return Err(ReconcileError::invalid_namespace(
            namespace,
            format!("{} id must be positive", kind),
        ));
    }
    Ok(id)
}

/// Resolves a namespace string into tenant information
pub trait NamespaceParser: Send + Sync {
    fn parse(&self, namespace: &str) -> Result<NamespaceInfo>;
}

/// Parser for the standard claims namespace format
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNamespaceParser;

impl NamespaceParser for DefaultNamespaceParser {
    fn parse(&self, namespace: &str) -> Result<NamespaceInfo> {
        NamespaceInfo::parse(namespace)
    }
}
