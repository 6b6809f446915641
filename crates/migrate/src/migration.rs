use hoard_common::StateTree;

/// Error type migration bodies may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type ApplyFn = Box<dyn Fn(StateTree) -> Result<StateTree, BoxError> + Send + Sync>;

/// A named, one-time transform from a full state snapshot to a new one.
///
/// The body may read and write any field, including other migrations' flags
/// in `migrations`. The engine sets this migration's own flag after the body
/// returns successfully.
pub struct Migration {
    key: String,
    apply: ApplyFn,
}

impl Migration {
    pub fn new<F>(key: impl Into<String>, apply: F) -> Self
    where
        F: Fn(StateTree) -> Result<StateTree, BoxError> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            apply: Box::new(apply),
        }
    }

    /// Unique key, also the name of the completion flag.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run the body. Does not consult or set the completion flag.
    pub fn apply(&self, state: StateTree) -> Result<StateTree, BoxError> {
        (self.apply)(state)
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration").field("key", &self.key).finish()
    }
}
