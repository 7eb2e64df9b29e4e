//! Port abstraction for the key-value store that holds users and their
//! uniqueness claims.
//!
//! The store offers point reads, identifier sequences, and one write
//! primitive: an [`AtomicBatch`] of preconditions and mutations that commits
//! as a single unit. Adapters must evaluate every precondition and apply every
//! mutation without any intermediate state becoming visible, and must apply
//! nothing when a precondition fails.

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Failures raised by key-value store adapters.
    pub enum StoreError {
        /// The store could not be reached.
        Connection { message: String } => "key-value store connection failed: {message}",
        /// The store rejected or failed an operation.
        Backend { message: String } => "key-value store operation failed: {message}",
        /// A stored record could not be encoded or decoded.
        Serialization { message: String } => "stored record serialisation failed: {message}",
        /// A batch precondition did not hold; nothing was written.
        PreconditionFailed { key: String } => "atomic batch precondition failed for key {key}",
        /// The operation did not finish before the request deadline.
        Timeout { operation: String } => "{operation} did not complete before its deadline",
        /// The request was cancelled before the operation finished.
        Cancelled { operation: String } => "{operation} was cancelled",
    }
}

/// Condition a batch checks before writing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The key must not exist.
    Absent { key: String },
    /// The key must exist and hold exactly `value`.
    Equals { key: String, value: Vec<u8> },
}

impl Precondition {
    /// Key the condition inspects.
    pub fn key(&self) -> &str {
        match self {
            Self::Absent { key } | Self::Equals { key, .. } => key.as_str(),
        }
    }
}

/// Write applied when every precondition holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Store `value` under `key`, replacing any previous value.
    Put { key: String, value: Vec<u8> },
    /// Remove `key` if present.
    Delete { key: String },
}

impl Mutation {
    /// Key the mutation writes.
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key.as_str(),
        }
    }
}

/// Preconditions and mutations committed together.
///
/// # Examples
/// ```
/// use user_registry::domain::ports::{AtomicBatch, Mutation, Precondition};
///
/// let mut batch = AtomicBatch::new();
/// batch
///     .require_absent("claim:email:ada@example.test")
///     .put("claim:email:ada@example.test", b"{}".to_vec());
///
/// assert_eq!(batch.preconditions().len(), 1);
/// assert!(matches!(batch.mutations()[0], Mutation::Put { .. }));
/// assert!(matches!(batch.preconditions()[0], Precondition::Absent { .. }));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomicBatch {
    preconditions: Vec<Precondition>,
    mutations: Vec<Mutation>,
}

impl AtomicBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to be absent at commit time.
    pub fn require_absent(&mut self, key: impl Into<String>) -> &mut Self {
        self.preconditions
            .push(Precondition::Absent { key: key.into() });
        self
    }

    /// Require `key` to hold exactly `value` at commit time.
    pub fn require_equals(&mut self, key: impl Into<String>, value: Vec<u8>) -> &mut Self {
        self.preconditions.push(Precondition::Equals {
            key: key.into(),
            value,
        });
        self
    }

    /// Queue a write of `value` under `key`.
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) -> &mut Self {
        self.mutations.push(Mutation::Put {
            key: key.into(),
            value,
        });
        self
    }

    /// Queue removal of `key`.
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.mutations.push(Mutation::Delete { key: key.into() });
        self
    }

    /// Conditions in the order they were added.
    pub fn preconditions(&self) -> &[Precondition] {
        &self.preconditions
    }

    /// Mutations in the order they will be applied.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// True when the batch neither checks nor writes anything.
    pub fn is_empty(&self) -> bool {
        self.preconditions.is_empty() && self.mutations.is_empty()
    }

    /// Split the batch into its preconditions and mutations.
    pub fn into_parts(self) -> (Vec<Precondition>, Vec<Mutation>) {
        (self.preconditions, self.mutations)
    }
}

/// Key-value store holding user records and claim markers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Allocate the next identifier from the named sequence, starting at 1.
    ///
    /// Identifiers handed out for a batch that later fails are not reused.
    async fn next_id(&self, sequence: &str) -> Result<i64, StoreError>;

    /// Commit `batch` atomically.
    ///
    /// Returns [`StoreError::PreconditionFailed`] naming the first failing
    /// key when any precondition does not hold; nothing is written in that
    /// case.
    async fn commit(&self, batch: AtomicBatch) -> Result<(), StoreError>;
}
