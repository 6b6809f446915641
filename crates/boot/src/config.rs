/// Bootstrap configuration.
#[derive(Debug, Clone)]
pub struct BootConfig {
    /// Key under which a pre-store client kept its identity.
    pub legacy_identity_key: String,
    /// Whether identity observers (telemetry) are started after identification.
    pub run_telemetry: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            legacy_identity_key: "uid".into(),
            run_telemetry: true,
        }
    }
}
