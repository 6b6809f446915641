use hoard_common::{FieldName, StateTree, SystemInfo, Value, fields};
use hoard_kernel::{StateStore, StoreError, Update};
use hoard_migrate::{BoxError, MigrationEngine, MigrationError};
use hoard_persist::{PersistError, PersistenceAdapter};
use hoard_schema::SchemaRegistry;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::Instrument;

use crate::boundary::{
    Catalog, CatalogLoader, HostProbe, IdentityObserver, LegacyIdentitySource, NoLegacyIdentity,
    SystemProbe,
};
use crate::config::BootConfig;
use crate::identity::{self, IdentitySource};

/// Errors that halt startup.
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error("schema is missing required field {0}")]
    MissingField(&'static str),
    #[error("field {0} must be declared persisted")]
    NotPersisted(&'static str),
    #[error("failed to load persisted field {field}: {source}")]
    Load {
        field: FieldName,
        #[source]
        source: PersistError,
    },
    #[error("catalog load failed: {0}")]
    Catalog(#[source] BoxError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("commit rejected: {0}")]
    Commit(#[from] StoreError),
}

/// What startup did, for diagnostics.
#[derive(Debug)]
pub struct BootReport {
    /// Persisted fields found in the adapter.
    pub loaded_fields: Vec<FieldName>,
    pub identity: String,
    pub identity_source: IdentitySource,
    pub system: SystemInfo,
    /// Migrations whose bodies ran, in order (identity adoption included).
    pub applied_migrations: Vec<String>,
    /// Fields that differed from disk/defaults and were committed.
    pub committed_fields: Vec<FieldName>,
    /// Write-through failures during the commit. Startup still succeeds.
    pub persistence_errors: Vec<StoreError>,
}

/// A store that has completed startup.
#[derive(Debug)]
pub struct Booted {
    pub store: StateStore,
    pub report: BootReport,
}

/// Builder for the startup sequence.
///
/// ```text
/// defaults -> catalog -> persisted overrides -> identity -> system
///          -> telemetry (detached) -> migrations -> single commit
/// ```
pub struct Bootstrap {
    schema: SchemaRegistry,
    adapter: Arc<dyn PersistenceAdapter>,
    migrations: MigrationEngine,
    catalog: Option<Box<dyn CatalogLoader>>,
    legacy: Arc<dyn LegacyIdentitySource>,
    probe: Box<dyn SystemProbe>,
    observers: Vec<Arc<dyn IdentityObserver>>,
    config: BootConfig,
}

impl Bootstrap {
    pub fn new(schema: SchemaRegistry, adapter: Arc<dyn PersistenceAdapter>) -> Self {
        Self {
            schema,
            adapter,
            migrations: MigrationEngine::new(),
            catalog: None,
            legacy: Arc::new(NoLegacyIdentity),
            probe: Box::new(HostProbe),
            observers: Vec::new(),
            config: BootConfig::default(),
        }
    }

    pub fn migrations(mut self, engine: MigrationEngine) -> Self {
        self.migrations = engine;
        self
    }

    pub fn catalog(mut self, loader: impl CatalogLoader + 'static) -> Self {
        self.catalog = Some(Box::new(loader));
        self
    }

    pub fn legacy_identity(mut self, source: impl LegacyIdentitySource + 'static) -> Self {
        self.legacy = Arc::new(source);
        self
    }

    pub fn probe(mut self, probe: impl SystemProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn observe_identity(mut self, observer: Arc<dyn IdentityObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(mut self, config: BootConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the whole sequence and hand back the committed store.
    pub async fn run(self) -> Result<Booted, BootError> {
        let span = tracing::info_span!("bootstrap");
        self.run_sequence().instrument(span).await
    }

    async fn run_sequence(self) -> Result<Booted, BootError> {
        self.check_schema()?;

        // 1. defaults
        let mut state = self.schema.defaults();

        // 2 + 3. catalog and disk reads may overlap; their results fold in order below.
        let persisted = self.schema.persisted_fields();
        let adapter = Arc::clone(&self.adapter);
        let load_disk = async move { load_persisted(adapter.as_ref(), &persisted) };
        let load_catalog = async {
            match &self.catalog {
                Some(loader) => loader.load().await.map(Some),
                None => Ok(None),
            }
        };
        let (disk, catalog) = futures::join!(load_disk, load_catalog);

        if let Some(catalog) = catalog.map_err(BootError::Catalog)? {
            state.insert(fields::CATALOG, catalog_value(catalog));
        }

        let disk = disk?;
        let loaded_fields: Vec<FieldName> = disk.iter().map(|(k, _)| k.clone()).collect();
        tracing::info!(loaded = loaded_fields.len(), "persisted fields loaded");
        for (field, value) in disk.iter() {
            state.insert(field.clone(), value.clone());
        }
        let baseline = disk;

        // 4. identity
        let had_identity = identity::current_identity(&state).is_some();
        let adopt = identity::adopt_legacy_identity(
            Arc::clone(&self.legacy),
            self.config.legacy_identity_key.clone(),
        );
        let (next, adopted_ran) = MigrationEngine::run_one(&adopt, state)?;
        let adopted = !had_identity && identity::current_identity(&next).is_some();
        let (next, identity, generated) = identity::ensure_identity(next);
        state = next;
        let identity_source = if had_identity {
            IdentitySource::Stored
        } else if adopted {
            IdentitySource::Legacy
        } else {
            debug_assert!(generated);
            IdentitySource::Generated
        };

        // 5. system
        let system = self.probe.probe().unwrap_or_else(|| {
            tracing::warn!("system detection unavailable; using defaults");
            SystemInfo::default()
        });
        if self.schema.contains(fields::SYSTEM) {
            state.insert(
                fields::SYSTEM,
                serde_json::to_value(system).unwrap_or_default(),
            );
        }

        // 6. identity-dependent side effects, detached
        if self.config.run_telemetry {
            start_observers(&self.observers, &identity, system);
        }

        // 7. migrations
        let outcome = self.migrations.run(state)?;
        let mut applied_migrations = Vec::new();
        if adopted_ran {
            applied_migrations.push(identity::ADOPT_LEGACY_IDENTITY.to_string());
        }
        applied_migrations.extend(outcome.applied);

        // 8. single commit
        let store = StateStore::with_baseline(self.schema, self.adapter, baseline);
        let commit = store.write(Update::from(outcome.state))?;
        for e in &commit.persistence_errors {
            tracing::warn!(error = %e, "startup commit not fully durable");
        }
        tracing::info!(
            identity_source = ?identity_source,
            committed = commit.changed.len(),
            "bootstrap complete"
        );

        Ok(Booted {
            store,
            report: BootReport {
                loaded_fields,
                identity,
                identity_source,
                system,
                applied_migrations,
                committed_fields: commit.changed,
                persistence_errors: commit.persistence_errors,
            },
        })
    }

    fn check_schema(&self) -> Result<(), BootError> {
        for field in [fields::MIGRATIONS, fields::IDENTITY] {
            if !self.schema.contains(field) {
                return Err(BootError::MissingField(field));
            }
            if !self.schema.is_persisted(field) {
                return Err(BootError::NotPersisted(field));
            }
        }
        if self.catalog.is_some() && !self.schema.contains(fields::CATALOG) {
            return Err(BootError::MissingField(fields::CATALOG));
        }
        Ok(())
    }
}

/// Read every persisted field the adapter holds a value for.
fn load_persisted(
    adapter: &dyn PersistenceAdapter,
    persisted: &std::collections::BTreeSet<FieldName>,
) -> Result<StateTree, BootError> {
    let mut loaded = StateTree::new();
    for field in persisted {
        match adapter.get(field) {
            Ok(Some(value)) => {
                loaded.insert(field.clone(), value);
            }
            Ok(None) => {}
            Err(source) => {
                return Err(BootError::Load {
                    field: field.clone(),
                    source,
                });
            }
        }
    }
    Ok(loaded)
}

fn catalog_value(catalog: Catalog) -> Value {
    Value::Object(catalog.into_iter().collect())
}

fn start_observers(observers: &[Arc<dyn IdentityObserver>], identity: &str, system: SystemInfo) {
    for observer in observers {
        let observer = Arc::clone(observer);
        let identity = identity.to_string();
        let spawned = std::thread::Builder::new()
            .name("hoard-identity-observer".into())
            .spawn(move || {
                if catch_unwind(AssertUnwindSafe(|| observer.on_identity(&identity, &system)))
                    .is_err()
                {
                    tracing::warn!("identity observer panicked");
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not start identity observer");
        }
    }
}
