//! Collaborators the sequencer consults but does not own.

use async_trait::async_trait;
use hoard_common::{PlatformFamily, SystemInfo, Value};
use hoard_migrate::BoxError;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Item identifier -> item descriptor.
pub type Catalog = BTreeMap<String, Value>;

/// Loads the external item catalog once during startup.
#[async_trait]
pub trait CatalogLoader: Send + Sync {
    async fn load(&self) -> Result<Catalog, BoxError>;
}

/// A catalog known up front.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog(pub Catalog);

#[async_trait]
impl CatalogLoader for StaticCatalog {
    async fn load(&self) -> Result<Catalog, BoxError> {
        Ok(self.0.clone())
    }
}

/// A catalog read from a JSON object file.
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogLoader for JsonFileCatalog {
    async fn load(&self) -> Result<Catalog, BoxError> {
        let raw = std::fs::read(&self.path)?;
        let catalog: Catalog = serde_json::from_slice(&raw)?;
        tracing::debug!(path = %self.path.display(), items = catalog.len(), "catalog loaded");
        Ok(catalog)
    }
}

/// Read-only lookup into the storage an older client used for its identity.
///
/// Implementations never fail: anything unreadable is reported as absent.
pub trait LegacyIdentitySource: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// No legacy storage exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLegacyIdentity;

impl LegacyIdentitySource for NoLegacyIdentity {
    fn lookup(&self, _key: &str) -> Option<String> {
        None
    }
}

impl LegacyIdentitySource for BTreeMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Legacy storage laid out as one plain-text file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileLegacyIdentity {
    dir: PathBuf,
}

impl FileLegacyIdentity {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LegacyIdentitySource for FileLegacyIdentity {
    fn lookup(&self, key: &str) -> Option<String> {
        let path = self.dir.join(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Some(raw.trim().to_string()).filter(|s| !s.is_empty()),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no legacy identity");
                None
            }
        }
    }
}

/// Best-effort detection of the host system. `None` means detection was impossible.
pub trait SystemProbe: Send + Sync {
    fn probe(&self) -> Option<SystemInfo>;
}

/// Probe for the machine the process runs on.
///
/// Specialized hardware is reported when `HOARD_SPECIALIZED_HARDWARE` is set
/// to `1` or `true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl SystemProbe for HostProbe {
    fn probe(&self) -> Option<SystemInfo> {
        let platform = PlatformFamily::from_os(std::env::consts::OS);
        let specialized_hardware = std::env::var("HOARD_SPECIALIZED_HARDWARE")
            .map(|v| matches!(v.trim(), "1" | "true"))
            .unwrap_or(false);
        Some(SystemInfo {
            platform,
            specialized_hardware,
        })
    }
}

impl<F> SystemProbe for F
where
    F: Fn() -> Option<SystemInfo> + Send + Sync,
{
    fn probe(&self) -> Option<SystemInfo> {
        self()
    }
}

/// Side effects that need the install's identity (analytics, crash reporting).
///
/// Called on a detached thread once identity is known; state correctness never
/// depends on it completing.
pub trait IdentityObserver: Send + Sync {
    fn on_identity(&self, identity: &str, system: &SystemInfo);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn static_catalog_loads() {
        let mut items = Catalog::new();
        items.insert("sword".into(), json!({"slot": "hand"}));
        let loaded = pollster::block_on(StaticCatalog(items.clone()).load()).unwrap();
        assert_eq!(loaded, items);
    }

    #[test]
    fn json_file_catalog_loads_and_reports_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.json");
        std::fs::write(&path, r#"{"helmet": {"slot": "head"}}"#).unwrap();
        let loaded = pollster::block_on(JsonFileCatalog::new(&path).load()).unwrap();
        assert_eq!(loaded["helmet"], json!({"slot": "head"}));

        let missing = JsonFileCatalog::new(tmp.path().join("missing.json"));
        assert!(pollster::block_on(missing.load()).is_err());
    }

    #[test]
    fn file_legacy_identity_trims_and_ignores_missing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("uid"), "  legacy-123\n").unwrap();
        std::fs::write(tmp.path().join("blank"), "   ").unwrap();
        let src = FileLegacyIdentity::new(tmp.path());
        assert_eq!(src.lookup("uid").as_deref(), Some("legacy-123"));
        assert_eq!(src.lookup("blank"), None);
        assert_eq!(src.lookup("absent"), None);
    }

    #[test]
    fn host_probe_always_answers() {
        assert!(HostProbe.probe().is_some());
    }

    #[test]
    fn closures_are_probes() {
        let failing = || -> Option<SystemInfo> { None };
        assert_eq!(SystemProbe::probe(&failing), None);
    }
}
