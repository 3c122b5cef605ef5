use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;
use uuid::Uuid;

use crate::algebra::UnitAlgebra;
use crate::error::AssetError;
use crate::extent::Extent;
use crate::units::{AssayId, Label, Units};

/// Issuer facet for one asset kind. The contract host keys its escrow
/// accounts by [`Assay::id`]; everything else it needs (purse creation, the
/// unit algebra) hangs off this trait.
pub trait Assay: Send + Sync {
    fn id(&self) -> AssayId;

    fn label(&self) -> Label;

    fn algebra(&self) -> Arc<dyn UnitAlgebra>;

    fn empty_units(&self) -> Units {
        Units::new(self.label(), self.algebra().empty())
    }

    fn units(&self, extent: Extent) -> Units {
        Units::new(self.label(), extent)
    }

    fn make_empty_purse(&self) -> Arc<dyn Purse>;
}

/// A holder of balance for one asset kind.
///
/// Operations addressed to the same mint are serialized through the mint's
/// internal lock, so they complete in send order.
#[async_trait]
pub trait Purse: Send + Sync {
    fn assay_id(&self) -> AssayId;

    async fn balance(&self) -> Units;

    /// Deposit `payment`, requiring its units to equal `expected` exactly.
    ///
    /// On success the payment is consumed (its id leaves the live registry)
    /// and the new balance is returned. On any mismatch nothing is consumed
    /// and the caller still holds a spendable payment.
    async fn deposit_exactly(
        &self,
        expected: &Units,
        payment: &Payment,
    ) -> Result<Units, AssetError>;

    /// Deposit whatever `payment` carries.
    async fn deposit_all(&self, payment: &Payment) -> Result<Units, AssetError>;

    async fn withdraw(&self, units: &Units) -> Result<Payment, AssetError>;
}

/// A transferable claim on units, issued by a [`LocalMint`].
///
/// The struct itself is only a reference token: validity lives in the mint's
/// live-payment registry, so a payment that has been consumed once is
/// rejected everywhere afterwards, and a forged payment never validates.
pub struct Payment {
    id: Uuid,
    assay: Arc<dyn Assay>,
    units: Units,
}

impl Payment {
    pub fn assay(&self) -> Arc<dyn Assay> {
        Arc::clone(&self.assay)
    }

    pub fn assay_id(&self) -> AssayId {
        self.units.assay_id()
    }

    pub fn units(&self) -> &Units {
        &self.units
    }
}

impl std::fmt::Debug for Payment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payment")
            .field("id", &self.id)
            .field("units", &self.units)
            .finish()
    }
}

struct MintInner {
    assay_id: AssayId,
    label: Label,
    algebra: Arc<dyn UnitAlgebra>,
    live: AsyncMutex<HashSet<Uuid>>,
}

impl MintInner {
    async fn register_payment(inner: &Arc<Self>, units: Units) -> Payment {
        let id = Uuid::new_v4();
        inner.live.lock().await.insert(id);
        Payment {
            id,
            assay: Arc::new(LocalAssay {
                inner: Arc::clone(inner),
            }),
            units,
        }
    }

    async fn consume(&self, payment: &Payment) -> Result<(), AssetError> {
        if !self.live.lock().await.remove(&payment.id) {
            return Err(AssetError::UnknownPayment);
        }
        Ok(())
    }
}

/// In-memory mint for one asset kind.
pub struct LocalMint {
    inner: Arc<MintInner>,
}

impl LocalMint {
    pub fn new(description: impl Into<String>, algebra: Arc<dyn UnitAlgebra>) -> Self {
        let assay_id = AssayId::generate();
        Self {
            inner: Arc::new(MintInner {
                assay_id,
                label: Label::new(assay_id, description),
                algebra,
                live: AsyncMutex::new(HashSet::new()),
            }),
        }
    }

    pub fn assay(&self) -> Arc<dyn Assay> {
        Arc::new(LocalAssay {
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn label(&self) -> Label {
        self.inner.label.clone()
    }

    /// Issue a fresh payment carrying `extent`.
    pub async fn mint_payment(&self, extent: Extent) -> Result<Payment, AssetError> {
        // Kind check: combining with empty validates the extent shape.
        self.inner
            .algebra
            .with(&self.inner.algebra.empty(), &extent)?;
        let units = Units::new(self.inner.label.clone(), extent);
        let payment = MintInner::register_payment(&self.inner, units).await;
        debug!(assay = %self.inner.assay_id, "payment minted");
        Ok(payment)
    }

    /// Exclusive claim: invalidates `payment` and issues a fresh one with the
    /// same units.
    pub async fn claim(&self, payment: &Payment) -> Result<Payment, AssetError> {
        self.check_assay(payment)?;
        self.inner.consume(payment).await?;
        Ok(MintInner::register_payment(&self.inner, payment.units.clone()).await)
    }

    /// Destroy `payment`, returning the units it carried.
    pub async fn burn(&self, payment: &Payment) -> Result<Units, AssetError> {
        self.check_assay(payment)?;
        self.inner.consume(payment).await?;
        debug!(assay = %self.inner.assay_id, "payment burned");
        Ok(payment.units.clone())
    }

    fn check_assay(&self, payment: &Payment) -> Result<(), AssetError> {
        if payment.assay_id() != self.inner.assay_id {
            return Err(AssetError::WrongAssay {
                expected: self.inner.assay_id,
                actual: payment.assay_id(),
            });
        }
        Ok(())
    }
}

struct LocalAssay {
    inner: Arc<MintInner>,
}

impl Assay for LocalAssay {
    fn id(&self) -> AssayId {
        self.inner.assay_id
    }

    fn label(&self) -> Label {
        self.inner.label.clone()
    }

    fn algebra(&self) -> Arc<dyn UnitAlgebra> {
        Arc::clone(&self.inner.algebra)
    }

    fn make_empty_purse(&self) -> Arc<dyn Purse> {
        Arc::new(LocalPurse {
            inner: Arc::clone(&self.inner),
            balance: AsyncMutex::new(self.inner.algebra.empty()),
        })
    }
}

struct LocalPurse {
    inner: Arc<MintInner>,
    balance: AsyncMutex<Extent>,
}

impl LocalPurse {
    fn check_label(&self, units: &Units) -> Result<(), AssetError> {
        if units.assay_id() != self.inner.assay_id {
            return Err(AssetError::LabelMismatch {
                expected: self.inner.assay_id,
                actual: units.assay_id(),
            });
        }
        Ok(())
    }

    fn check_payment(&self, payment: &Payment) -> Result<(), AssetError> {
        if payment.assay_id() != self.inner.assay_id {
            return Err(AssetError::WrongAssay {
                expected: self.inner.assay_id,
                actual: payment.assay_id(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Purse for LocalPurse {
    fn assay_id(&self) -> AssayId {
        self.inner.assay_id
    }

    async fn balance(&self) -> Units {
        let balance = self.balance.lock().await;
        Units::new(self.inner.label.clone(), balance.clone())
    }

    async fn deposit_exactly(
        &self,
        expected: &Units,
        payment: &Payment,
    ) -> Result<Units, AssetError> {
        self.check_payment(payment)?;
        self.check_label(expected)?;

        let algebra = &self.inner.algebra;
        if !algebra.equals(&payment.units.extent, &expected.extent)? {
            return Err(AssetError::UnitsMismatch {
                stated: format!("{:?}", expected.extent),
                actual: format!("{:?}", payment.units.extent),
            });
        }

        let mut balance = self.balance.lock().await;
        let next = algebra.with(&balance, &payment.units.extent)?;
        self.inner.consume(payment).await?;
        *balance = next.clone();
        debug!(assay = %self.inner.assay_id, "exact deposit accepted");
        Ok(Units::new(self.inner.label.clone(), next))
    }

    async fn deposit_all(&self, payment: &Payment) -> Result<Units, AssetError> {
        self.check_payment(payment)?;

        let mut balance = self.balance.lock().await;
        let next = self.inner.algebra.with(&balance, &payment.units.extent)?;
        self.inner.consume(payment).await?;
        *balance = next.clone();
        Ok(Units::new(self.inner.label.clone(), next))
    }

    async fn withdraw(&self, units: &Units) -> Result<Payment, AssetError> {
        self.check_label(units)?;

        let mut balance = self.balance.lock().await;
        let rest = self.inner.algebra.without(&balance, &units.extent)?;
        *balance = rest;
        drop(balance);

        let payment = MintInner::register_payment(&self.inner, units.clone()).await;
        debug!(assay = %self.inner.assay_id, "withdrawal issued");
        Ok(payment)
    }
}
