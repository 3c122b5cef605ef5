//! Sample governing contracts for the Accord host.
//!
//! These contracts hold no assets and touch no registries: everything they do
//! flows through the [`ContractFacet`](accord_core::ContractFacet) they were
//! started with, and every reallocation they propose is re-proven by the host
//! before it commits.

#![deny(unsafe_code)]

pub mod auction;
pub mod swap;

pub use auction::{BidderPosition, SecondPriceAuction, SellerPosition};
pub use swap::{AtomicSwap, FirstPosition, SecondPosition};
