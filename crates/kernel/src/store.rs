use hoard_common::{FieldName, StateTree, Value};
use hoard_persist::{PersistError, PersistenceAdapter};
use hoard_schema::{FieldDescriptor, MergeStrategy, SchemaError, SchemaRegistry};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

use crate::subscription::{FieldChange, FieldPattern, SubscriberList, Subscription, lock};
use crate::update::Update;

/// Errors from state store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown field: {0}")]
    UnknownField(FieldName),
    #[error("schema is frozen; cannot register field {0}")]
    SchemaFrozen(FieldName),
    #[error("field registered twice: {0}")]
    DuplicateField(FieldName),
    #[error("persisted field name is not a valid storage key: {0:?}")]
    UnstorableName(FieldName),
    #[error("failed to persist field {field}: {source}")]
    Persistence {
        field: FieldName,
        #[source]
        source: PersistError,
    },
    #[error("field {field} does not hold the requested type: {source}")]
    Decode {
        field: FieldName,
        #[source]
        source: serde_json::Error,
    },
}

impl From<SchemaError> for StoreError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::UnknownField(f) => Self::UnknownField(f),
            SchemaError::SchemaFrozen(f) => Self::SchemaFrozen(f),
            SchemaError::DuplicateField(f) => Self::DuplicateField(f),
            SchemaError::UnstorableName(f) => Self::UnstorableName(f),
        }
    }
}

/// Outcome of one `write` call.
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Fields whose value actually changed, in update order.
    pub changed: Vec<FieldName>,
    /// Write-through failures. Memory state was updated regardless.
    /// Includes failures from writes queued by subscribers during this call.
    pub persistence_errors: Vec<StoreError>,
    /// The write was issued from inside a notification callback and has been
    /// queued behind the current dispatch cycle.
    pub deferred: bool,
}

impl WriteReport {
    fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }

    /// Whether `field` changed in this write.
    pub fn changed(&self, field: &str) -> bool {
        self.changed.iter().any(|f| f == field)
    }

    /// Whether every changed persisted field reached the adapter.
    pub fn is_durable(&self) -> bool {
        self.persistence_errors.is_empty()
    }
}

/// The reactive application state store.
///
/// Owns the only live [`StateTree`]. Readers get `Arc` snapshots that never
/// change underneath them; writers go through [`StateStore::write`], which
/// merges, swaps the snapshot, writes persisted fields through to the adapter
/// and notifies subscribers, one call at a time.
pub struct StateStore {
    schema: RwLock<SchemaRegistry>,
    adapter: Arc<dyn PersistenceAdapter>,
    current: RwLock<Arc<StateTree>>,
    subscribers: Arc<Mutex<SubscriberList>>,
    /// Serializes writers across threads.
    writer: Mutex<()>,
    /// Thread currently running a write cycle, used to detect re-entrant writes.
    dispatching: Mutex<Option<ThreadId>>,
    /// Writes issued by callbacks during the current cycle.
    pending: Mutex<VecDeque<Update>>,
}

impl StateStore {
    /// Create a store holding every field at its schema default.
    pub fn new(schema: SchemaRegistry, adapter: Arc<dyn PersistenceAdapter>) -> Self {
        let tree = schema.defaults();
        Self::from_parts(schema, adapter, tree)
    }

    /// Create a store whose in-memory state mirrors `baseline`.
    ///
    /// `baseline` should describe what the adapter already holds, so the first
    /// write persists exactly the fields that differ from disk. Fields missing
    /// from `baseline` take their defaults; fields the schema does not declare
    /// are dropped.
    pub fn with_baseline(
        schema: SchemaRegistry,
        adapter: Arc<dyn PersistenceAdapter>,
        baseline: StateTree,
    ) -> Self {
        let mut tree = schema.defaults();
        for (field, value) in baseline {
            if schema.contains(&field) {
                tree.insert(field, value);
            } else {
                tracing::warn!(%field, "dropping undeclared field from baseline");
            }
        }
        Self::from_parts(schema, adapter, tree)
    }

    fn from_parts(
        schema: SchemaRegistry,
        adapter: Arc<dyn PersistenceAdapter>,
        tree: StateTree,
    ) -> Self {
        Self {
            schema: RwLock::new(schema),
            adapter,
            current: RwLock::new(Arc::new(tree)),
            subscribers: Arc::new(Mutex::new(SubscriberList::default())),
            writer: Mutex::new(()),
            dispatching: Mutex::new(None),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Declare a field after construction. Fails once the first write has happened.
    pub fn register(&self, descriptor: FieldDescriptor) -> Result<(), StoreError> {
        let mut schema = write_lock(&self.schema);
        let name = descriptor.name.clone();
        let default = descriptor.default.clone();
        schema.register(descriptor)?;

        let mut current = write_lock(&self.current);
        let mut tree = StateTree::clone(&current);
        tree.insert(name, default);
        *current = Arc::new(tree);
        Ok(())
    }

    /// Current value of a declared field.
    pub fn read(&self, field: &str) -> Result<Value, StoreError> {
        read_lock(&self.schema).field(field)?;
        Ok(self
            .snapshot()
            .get(field)
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Current value of a declared field, decoded into `T`.
    pub fn read_as<T: DeserializeOwned>(&self, field: &str) -> Result<T, StoreError> {
        let value = self.read(field)?;
        serde_json::from_value(value).map_err(|source| StoreError::Decode {
            field: field.to_string(),
            source,
        })
    }

    /// Immutable point-in-time copy of the whole tree.
    pub fn snapshot(&self) -> Arc<StateTree> {
        Arc::clone(&read_lock(&self.current))
    }

    /// Whether `field` is declared persisted.
    pub fn is_persisted(&self, field: &str) -> bool {
        read_lock(&self.schema).is_persisted(field)
    }

    /// Names of every declared field.
    pub fn field_names(&self) -> Vec<FieldName> {
        read_lock(&self.schema).iter().map(|d| d.name.clone()).collect()
    }

    /// Register `callback` for changes to fields matching `pattern`.
    ///
    /// The callback runs synchronously on the writing thread after the new
    /// value is visible, once per matching changed field per write. Writes it
    /// issues are queued and applied after the current dispatch cycle.
    pub fn subscribe<F>(
        &self,
        pattern: impl Into<FieldPattern>,
        callback: F,
    ) -> Result<Subscription, StoreError>
    where
        F: Fn(&FieldChange) + Send + Sync + 'static,
    {
        let pattern = pattern.into();
        if let FieldPattern::Field(name) = &pattern {
            read_lock(&self.schema).field(name)?;
        }
        let id = lock(&self.subscribers).add(pattern, Arc::new(callback));
        Ok(Subscription::new(id, &self.subscribers))
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Apply one batch of field changes.
    ///
    /// Unknown fields reject the whole batch before anything changes. For each
    /// field whose value changes structurally the new value is written through
    /// if persisted, then subscribers are notified. Write-through failures are
    /// logged and returned in the report; memory state is not rolled back.
    pub fn write(&self, update: impl Into<Update>) -> Result<WriteReport, StoreError> {
        let update = update.into();
        self.update_with(move |_| Ok::<_, StoreError>(update))
    }

    /// Read-modify-write: build an update from the committed tree and apply it
    /// without letting another writer in between.
    ///
    /// `build` runs with the writer lock held, so it must not call back into
    /// the store. From inside a notification callback it sees the tree as of
    /// the current dispatch and its update is queued like any re-entrant write.
    pub fn update_with<F, E>(&self, build: F) -> Result<WriteReport, E>
    where
        F: FnOnce(&StateTree) -> Result<Update, E>,
        E: From<StoreError>,
    {
        if self.is_dispatching_thread() {
            let update = build(self.snapshot().as_ref())?;
            self.validate(&update)?;
            tracing::debug!(fields = ?update.fields(), "queued re-entrant write");
            lock(&self.pending).push_back(update);
            return Ok(WriteReport::deferred());
        }

        let _writer = lock(&self.writer);
        let update = build(self.snapshot().as_ref())?;
        let _cycle = DispatchCycle::enter(&self.dispatching, &self.pending);

        let mut report = self.apply(update)?;
        loop {
            let Some(next) = lock(&self.pending).pop_front() else {
                break;
            };
            match self.apply(next) {
                Ok(queued) => report.persistence_errors.extend(queued.persistence_errors),
                Err(e) => tracing::warn!(error = %e, "queued write rejected"),
            }
        }
        Ok(report)
    }

    fn is_dispatching_thread(&self) -> bool {
        *lock(&self.dispatching) == Some(thread::current().id())
    }

    fn validate(&self, update: &Update) -> Result<(), StoreError> {
        let schema = read_lock(&self.schema);
        for field in update.fields() {
            schema.field(field)?;
        }
        Ok(())
    }

    fn apply(&self, update: Update) -> Result<WriteReport, StoreError> {
        let _span = tracing::debug_span!("write", entries = update.len()).entered();
        self.validate(&update)?;

        let previous = self.snapshot();
        let mut next = StateTree::clone(&previous);
        {
            let mut schema = write_lock(&self.schema);
            schema.freeze();
            for entry in update.entries() {
                let strategy = if entry.replace {
                    MergeStrategy::Replace
                } else {
                    schema.field(&entry.field)?.merge
                };
                let old = next.get(&entry.field).cloned().unwrap_or(Value::Null);
                let merged = strategy.merge(&old, entry.value.clone());
                next.insert(entry.field.clone(), merged);
            }
        }

        let changed: Vec<FieldName> = update
            .fields()
            .into_iter()
            .filter(|f| previous.get(f) != next.get(f))
            .map(str::to_string)
            .collect();

        let mut report = WriteReport::default();
        if changed.is_empty() {
            return Ok(report);
        }

        let next = Arc::new(next);
        *write_lock(&self.current) = Arc::clone(&next);

        for field in &changed {
            let current = next.get(field).cloned().unwrap_or(Value::Null);
            if self.is_persisted(field) {
                if let Err(source) = self.adapter.set(field, &current) {
                    tracing::warn!(%field, error = %source, "write-through failed; keeping in-memory value");
                    report.persistence_errors.push(StoreError::Persistence {
                        field: field.clone(),
                        source,
                    });
                } else {
                    tracing::debug!(%field, "persisted");
                }
            }
            let change = FieldChange {
                field: field.clone(),
                previous: previous.get(field).cloned().unwrap_or(Value::Null),
                current,
            };
            self.notify(&change);
        }

        report.changed = changed;
        Ok(report)
    }

    fn notify(&self, change: &FieldChange) {
        let callbacks = lock(&self.subscribers).matching(&change.field);
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(change))).is_err() {
                tracing::error!(field = %change.field, "subscriber panicked; continuing dispatch");
            }
        }
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("fields", &self.snapshot().len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Marks the current thread as the dispatching writer until dropped.
///
/// Writes still queued when the cycle ends belong to a cycle that unwound;
/// they are discarded rather than applied by some later, unrelated write.
struct DispatchCycle<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
    pending: &'a Mutex<VecDeque<Update>>,
}

impl<'a> DispatchCycle<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>, pending: &'a Mutex<VecDeque<Update>>) -> Self {
        *lock(slot) = Some(thread::current().id());
        Self { slot, pending }
    }
}

impl Drop for DispatchCycle<'_> {
    fn drop(&mut self) {
        let mut pending = lock(self.pending);
        if !pending.is_empty() {
            tracing::warn!(dropped = pending.len(), "discarding writes queued by an aborted cycle");
            pending.clear();
        }
        drop(pending);
        *lock(self.slot) = None;
    }
}

fn read_lock<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}
