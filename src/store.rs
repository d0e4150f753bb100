use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Document collections kept in a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Students,
    Subjects,
    Marks,
    Comments,
    Results,
    Settings,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Students,
        Collection::Subjects,
        Collection::Marks,
        Collection::Comments,
        Collection::Results,
        Collection::Settings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Students => "students",
            Collection::Subjects => "subjects",
            Collection::Marks => "marks",
            Collection::Comments => "comments",
            Collection::Results => "results",
            Collection::Settings => "settings",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocKey {
    pub collection: Collection,
    pub id: String,
}

impl DocKey {
    pub fn new(collection: Collection, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection.as_str(), self.id)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("document encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend refused the operation (offline, closed, injected failure).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Put(DocKey, Value),
    Delete(DocKey),
}

/// Multi-document write applied atomically by [`DocumentStore::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: DocKey, value: Value) -> &mut Self {
        self.ops.push(BatchOp::Put(key, value));
        self
    }

    pub fn delete(&mut self, key: DocKey) -> &mut Self {
        self.ops.push(BatchOp::Delete(key));
        self
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Key-addressable persistence used by the session. Implementations never
/// interpret document bodies.
pub trait DocumentStore {
    fn get(&self, key: &DocKey) -> Result<Option<Value>, StoreError>;
    fn put(&mut self, key: &DocKey, value: &Value) -> Result<(), StoreError>;
    fn delete(&mut self, key: &DocKey) -> Result<(), StoreError>;
    /// All documents of a collection as `(id, body)`, ordered by id.
    fn list(&self, collection: Collection) -> Result<Vec<(String, Value)>, StoreError>;
    fn commit(&mut self, batch: WriteBatch) -> Result<(), StoreError>;
}

#[cfg(test)]
pub use memory::MemoryStore;

#[cfg(test)]
mod memory {
    use super::*;
    use std::collections::BTreeMap;

    /// In-memory store that records every write and can be told to fail.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        pub docs: BTreeMap<DocKey, Value>,
        pub puts: Vec<(DocKey, Value)>,
        pub commits: usize,
        pub fail_writes: bool,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn puts_for(&self, key: &DocKey) -> Vec<&Value> {
            self.puts
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v)
                .collect()
        }

        fn check_writable(&self) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Unavailable("injected failure".into()));
            }
            Ok(())
        }
    }

    impl DocumentStore for MemoryStore {
        fn get(&self, key: &DocKey) -> Result<Option<Value>, StoreError> {
            Ok(self.docs.get(key).cloned())
        }

        fn put(&mut self, key: &DocKey, value: &Value) -> Result<(), StoreError> {
            self.check_writable()?;
            self.docs.insert(key.clone(), value.clone());
            self.puts.push((key.clone(), value.clone()));
            Ok(())
        }

        fn delete(&mut self, key: &DocKey) -> Result<(), StoreError> {
            self.check_writable()?;
            self.docs.remove(key);
            Ok(())
        }

        fn list(&self, collection: Collection) -> Result<Vec<(String, Value)>, StoreError> {
            Ok(self
                .docs
                .iter()
                .filter(|(k, _)| k.collection == collection)
                .map(|(k, v)| (k.id.clone(), v.clone()))
                .collect())
        }

        fn commit(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
            self.check_writable()?;
            for op in batch.into_ops() {
                match op {
                    BatchOp::Put(k, v) => {
                        self.docs.insert(k, v);
                    }
                    BatchOp::Delete(k) => {
                        self.docs.remove(&k);
                    }
                }
            }
            self.commits += 1;
            Ok(())
        }
    }
}
