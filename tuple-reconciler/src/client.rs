use crate::models::{Tuple, TupleKeyWithoutCondition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One mutation request against the remote tuple store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub namespace: String,
    pub writes: Vec<Tuple>,
    pub deletes: Vec<TupleKeyWithoutCondition>,
}

impl WriteRequest {
    pub fn writes(namespace: &str, writes: Vec<Tuple>) -> Self {
        Self {
            namespace: namespace.to_string(),
            writes,
            deletes: Vec::new(),
        }
    }

    pub fn deletes(namespace: &str, deletes: Vec<TupleKeyWithoutCondition>) -> Self {
        Self {
            namespace: namespace.to_string(),
            writes: Vec::new(),
            deletes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len().saturating_add(self.deletes.len())
    }
}

/// Client for the remote tuple store.
///
/// Implementations own transport concerns (auth, retries, timeouts). A
/// request never exceeds the reconciler's batch size and is never empty.
#[async_trait]
pub trait RemoteStoreClient: Send + Sync {
    async fn write(&self, request: WriteRequest) -> anyhow::Result<()>;
}
