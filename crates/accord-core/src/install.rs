use std::sync::Arc;

use async_trait::async_trait;

use accord_assets::Assay;

use crate::error::HostError;
use crate::facet::ContractFacet;
use crate::seats::{Invite, SeatObject};

/// Instance parameters a governing contract is started with: the canonical
/// assay ordering plus contract-defined parameters.
#[derive(Clone)]
pub struct Terms {
    pub assays: Vec<Arc<dyn Assay>>,
    pub params: serde_json::Value,
}

impl Terms {
    pub fn new(assays: Vec<Arc<dyn Assay>>) -> Self {
        Self {
            assays,
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// What a contract hands back from startup: an initial invite, a public
/// object, both, or neither.
pub struct StartOutput {
    pub invite: Option<Invite>,
    pub public: Option<SeatObject>,
}

impl StartOutput {
    pub fn empty() -> Self {
        Self {
            invite: None,
            public: None,
        }
    }

    pub fn with_invite(invite: Invite) -> Self {
        Self {
            invite: Some(invite),
            public: None,
        }
    }

    pub fn and_public(mut self, public: SeatObject) -> Self {
        self.public = Some(public);
        self
    }
}

/// The contract-loading boundary.
///
/// Installed code is a registered factory: it receives exactly the facet and
/// the terms, nothing else. There is no ambient path from contract code to
/// the host's registries or to other instances; whatever authority a contract
/// exercises flows through the facet it was constructed with.
#[async_trait]
pub trait ContractInstaller: Send + Sync {
    async fn start(&self, facet: ContractFacet, terms: Terms) -> Result<StartOutput, HostError>;
}
