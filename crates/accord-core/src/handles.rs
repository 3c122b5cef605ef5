use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Handles are bare unforgeable identities: uuid-v4 newtypes whose only
// constructor is crate-private, so the host is the sole source of live
// handles. Equality is identity; a deleted offer handle is never reissued.

/// Identity of installed, not-yet-instantiated contract code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstallationHandle(Uuid);

impl InstallationHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for InstallationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex = self.0.simple().to_string();
        write!(f, "{}", &hex[..8])
    }
}

/// Identity of one running contract instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceHandle(Uuid);

impl InstanceHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex = self.0.simple().to_string();
        write!(f, "{}", &hex[..8])
    }
}

/// Identity of one party's live position in one instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferHandle(Uuid);

impl OfferHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for OfferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex = self.0.simple().to_string();
        write!(f, "{}", &hex[..8])
    }
}
