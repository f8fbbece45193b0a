use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a cache artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheOrigin {
    /// Named by the user to skip retraining.
    UserSupplied,
    /// Produced by a training job.
    ServerGenerated,
}

/// A server-persisted trained model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheArtifact {
    pub name: String,
    pub origin: CacheOrigin,
    /// The server removes it after the next generation request uses it.
    pub pending_deletion: bool,
}

impl CacheArtifact {
    pub fn user_supplied(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: CacheOrigin::UserSupplied,
            pending_deletion: false,
        }
    }

    pub fn server_generated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: CacheOrigin::ServerGenerated,
            pending_deletion: false,
        }
    }
}

/// Offered → {Saving, Deleting} → Resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheState {
    Offered,
    Saving,
    Deleting,
    Resolved,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheState::Offered => write!(f, "OFFERED"),
            CacheState::Saving => write!(f, "SAVING"),
            CacheState::Deleting => write!(f, "DELETING"),
            CacheState::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// A freshly trained artifact waiting for the user to keep or discard it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOffer {
    pub artifact: CacheArtifact,
    /// Name the server gave the artifact.
    pub default_name: String,
    pub state: CacheState,
}

impl CacheOffer {
    pub fn new(default_name: impl Into<String>) -> Self {
        let default_name = default_name.into();
        Self {
            artifact: CacheArtifact::server_generated(default_name.clone()),
            default_name,
            state: CacheState::Offered,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == CacheState::Offered
    }

    /// Whether saving under `name` needs a rename on the server.
    pub fn needs_rename(&self, name: Option<&str>) -> bool {
        match name.map(str::trim) {
            None | Some("") => false,
            Some(n) => n != self.default_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_starts_open_with_server_artifact() {
        let offer = CacheOffer::new("model_abc.cache");
        assert!(offer.is_open());
        assert_eq!(offer.artifact.origin, CacheOrigin::ServerGenerated);
        assert_eq!(offer.artifact.name, "model_abc.cache");
        assert!(!offer.artifact.pending_deletion);
    }

    #[test]
    fn rename_only_when_name_differs() {
        let offer = CacheOffer::new("model_abc.cache");
        assert!(!offer.needs_rename(None));
        assert!(!offer.needs_rename(Some("")));
        assert!(!offer.needs_rename(Some("  ")));
        assert!(!offer.needs_rename(Some("model_abc.cache")));
        assert!(offer.needs_rename(Some("my_model")));
    }

    #[test]
    fn user_supplied_artifact() {
        let artifact = CacheArtifact::user_supplied("porto.pkl");
        assert_eq!(artifact.origin, CacheOrigin::UserSupplied);
    }

    #[test]
    fn state_display() {
        assert_eq!(CacheState::Offered.to_string(), "OFFERED");
        assert_eq!(CacheState::Resolved.to_string(), "RESOLVED");
    }
}
