//! Asset-side collaborators for the Accord contract host.
//!
//! This crate defines what an "amount" means: extents, the pluggable unit
//! algebra that combines them, and labeled units. It also ships an in-memory
//! mint/issuer/purse/payment implementation used by tests and embedders; the
//! host itself only ever sees the `Assay` and `Purse` trait surfaces.

#![deny(unsafe_code)]

pub mod algebra;
pub mod error;
pub mod extent;
pub mod ledger;
pub mod units;

pub use algebra::{NatAlgebra, SetAlgebra, UnitAlgebra};
pub use error::AssetError;
pub use extent::Extent;
pub use ledger::{Assay, LocalMint, Payment, Purse};
pub use units::{AssayId, Label, Units};
