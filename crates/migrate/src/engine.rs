use hoard_common::StateTree;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::migration::{BoxError, Migration};

/// Errors from the migration engine.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A migration body failed. `completed` lists the migrations that ran
    /// earlier in the same pass; their flags exist only in the discarded snapshot.
    #[error("migration {key} failed: {source}")]
    Failed {
        key: String,
        completed: Vec<String>,
        #[source]
        source: BoxError,
    },
    #[error("migration key declared twice: {0}")]
    DuplicateKey(String),
}

/// Result of a successful pass.
#[derive(Debug)]
pub struct MigrationOutcome {
    /// State after every pending migration ran, flags included.
    pub state: StateTree,
    /// Keys whose bodies ran during this pass, in order.
    pub applied: Vec<String>,
    /// Keys skipped because their flag was already set.
    pub skipped: Vec<String>,
}

/// Statically ordered list of migrations.
#[derive(Debug, Default)]
pub struct MigrationEngine {
    migrations: Vec<Migration>,
}

impl MigrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a migration. It runs after every migration added before it.
    pub fn push(&mut self, migration: Migration) -> Result<(), MigrationError> {
        if self.migrations.iter().any(|m| m.key() == migration.key()) {
            return Err(MigrationError::DuplicateKey(migration.key().to_string()));
        }
        self.migrations.push(migration);
        Ok(())
    }

    /// Builder-style `push`.
    pub fn with(mut self, migration: Migration) -> Result<Self, MigrationError> {
        self.push(migration)?;
        Ok(self)
    }

    /// Keys in execution order.
    pub fn keys(&self) -> Vec<&str> {
        self.migrations.iter().map(Migration::key).collect()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Keys that would run against `state`.
    pub fn pending(&self, state: &StateTree) -> Vec<&str> {
        self.migrations
            .iter()
            .map(Migration::key)
            .filter(|k| !state.migration_applied(k))
            .collect()
    }

    /// Run every pending migration in order, threading each output into the next.
    ///
    /// Stops at the first failure; the failed migration stays unflagged and
    /// nothing later runs.
    pub fn run(&self, state: StateTree) -> Result<MigrationOutcome, MigrationError> {
        let _span = tracing::info_span!("migrate", total = self.migrations.len()).entered();
        let mut current = state;
        let mut applied = Vec::new();
        let mut skipped = Vec::new();

        for migration in &self.migrations {
            match run_guarded(migration, current) {
                Ok((next, true)) => {
                    applied.push(migration.key().to_string());
                    current = next;
                }
                Ok((next, false)) => {
                    skipped.push(migration.key().to_string());
                    current = next;
                }
                Err(source) => {
                    tracing::error!(key = migration.key(), error = %source, "migration failed; aborting");
                    return Err(MigrationError::Failed {
                        key: migration.key().to_string(),
                        completed: applied,
                        source,
                    });
                }
            }
        }

        tracing::info!(applied = applied.len(), skipped = skipped.len(), "migrations complete");
        Ok(MigrationOutcome {
            state: current,
            applied,
            skipped,
        })
    }

    /// Run a single migration under its completion flag, outside any list.
    ///
    /// Returns the new state and whether the body ran.
    pub fn run_one(
        migration: &Migration,
        state: StateTree,
    ) -> Result<(StateTree, bool), MigrationError> {
        run_guarded(migration, state).map_err(|source| MigrationError::Failed {
            key: migration.key().to_string(),
            completed: Vec::new(),
            source,
        })
    }
}

fn run_guarded(migration: &Migration, state: StateTree) -> Result<(StateTree, bool), BoxError> {
    let key = migration.key();
    if state.migration_applied(key) {
        tracing::debug!(key, "already applied; skipping");
        return Ok((state, false));
    }

    let mut next = match catch_unwind(AssertUnwindSafe(|| migration.apply(state))) {
        Ok(result) => result?,
        Err(payload) => return Err(panic_message(payload).into()),
    };
    next.mark_migration(key);
    tracing::info!(key, "applied migration");
    Ok((next, true))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_common::Value;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fresh() -> StateTree {
        let mut t = StateTree::new();
        t.insert("migrations", json!({}));
        t
    }

    fn counting(key: &str, calls: &Arc<AtomicUsize>) -> Migration {
        let calls = Arc::clone(calls);
        Migration::new(key, move |mut s: StateTree| {
            calls.fetch_add(1, Ordering::SeqCst);
            let n = s.get("n").and_then(Value::as_i64).unwrap_or(0);
            s.insert("n", json!(n + 1));
            Ok(s)
        })
    }

    #[test]
    fn applies_once_across_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = MigrationEngine::new().with(counting("bump", &calls)).unwrap();

        let first = engine.run(fresh()).unwrap();
        assert_eq!(first.applied, ["bump"]);
        assert!(first.state.migration_applied("bump"));

        let second = engine.run(first.state).unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.skipped, ["bump"]);
        assert!(second.state.migration_applied("bump"));
        assert_eq!(second.state.get("n"), Some(&json!(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn later_migrations_see_earlier_output() {
        let engine = MigrationEngine::new()
            .with(Migration::new("a", |mut s: StateTree| {
                s.insert("level", json!(3));
                Ok(s)
            }))
            .and_then(|e| {
                e.with(Migration::new("b", |mut s: StateTree| {
                    let level = s
                        .get("level")
                        .and_then(Value::as_i64)
                        .ok_or("level missing")?;
                    s.insert("xp", json!(level * 100));
                    Ok(s)
                }))
            })
            .unwrap();

        let out = engine.run(fresh()).unwrap();
        assert_eq!(out.state.get("xp"), Some(&json!(300)));
        assert_eq!(out.applied, ["a", "b"]);
    }

    #[test]
    fn failure_aborts_remaining_and_leaves_flag_unset() {
        let after = Arc::new(AtomicUsize::new(0));
        let engine = MigrationEngine::new()
            .with(Migration::new("ok", |s: StateTree| Ok(s)))
            .and_then(|e| e.with(Migration::new("boom", |_: StateTree| Err("disk shape unexpected".into()))))
            .and_then(|e| e.with(counting("never", &after)))
            .unwrap();

        match engine.run(fresh()) {
            Err(MigrationError::Failed { key, completed, .. }) => {
                assert_eq!(key, "boom");
                assert_eq!(completed, ["ok"]);
            }
            other => panic!("expected Failed, got: {other:?}"),
        }
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_body_is_a_failure() {
        let engine = MigrationEngine::new()
            .with(Migration::new("explodes", |_: StateTree| -> Result<StateTree, BoxError> {
                panic!("bad index")
            }))
            .unwrap();
        let err = engine.run(fresh()).unwrap_err();
        assert!(err.to_string().contains("bad index"), "{err}");
    }

    #[test]
    fn fixup_runs_only_when_other_flag_present() {
        // "fix" repairs data written by the retired "buggy" migration; it must
        // run only on installs where "buggy" already ran.
        let fix = || {
            Migration::new("fix", |mut s: StateTree| {
                if s.migration_applied("buggy") {
                    s.insert("repaired", json!(true));
                }
                Ok(s)
            })
        };

        let engine = MigrationEngine::new().with(fix()).unwrap();

        let mut old_install = fresh();
        old_install.mark_migration("buggy");
        let out = engine.run(old_install).unwrap();
        assert_eq!(out.state.get("repaired"), Some(&json!(true)));

        let out = engine.run(fresh()).unwrap();
        assert_eq!(out.state.get("repaired"), None);
        assert!(out.state.migration_applied("fix"));
    }

    #[test]
    fn duplicate_keys_rejected() {
        let err = MigrationEngine::new()
            .with(Migration::new("a", Ok))
            .and_then(|e| e.with(Migration::new("a", Ok)))
            .unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateKey(k) if k == "a"));
    }

    #[test]
    fn pending_lists_unflagged_keys() {
        let engine = MigrationEngine::new()
            .with(Migration::new("a", Ok))
            .and_then(|e| e.with(Migration::new("b", Ok)))
            .unwrap();
        let mut state = fresh();
        state.mark_migration("a");
        assert_eq!(engine.pending(&state), ["b"]);
        assert_eq!(engine.keys(), ["a", "b"]);
    }

    #[test]
    fn run_one_respects_flag() {
        let calls = Arc::new(AtomicUsize::new(0));
        let m = counting("solo", &calls);
        let (state, ran) = MigrationEngine::run_one(&m, fresh()).unwrap();
        assert!(ran);
        let (_, ran) = MigrationEngine::run_one(&m, state).unwrap();
        assert!(!ran);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_migrations_field_is_created() {
        let engine = MigrationEngine::new().with(Migration::new("a", Ok)).unwrap();
        let out = engine.run(StateTree::new()).unwrap();
        assert_eq!(out.state.get("migrations"), Some(&json!({"a": true})));
    }
}
