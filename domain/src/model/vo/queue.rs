use std::collections::HashMap;

/// Backend-reported information about one queue, untyped on purpose: each
/// batch system exposes different columns.
#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    pub name: String,
    pub info: HashMap<String, String>,
}

impl QueueStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            info: HashMap::new(),
        }
    }
}
