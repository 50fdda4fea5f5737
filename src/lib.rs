//! # Approximate Multi-party PSI project
//!
//! Multi-party private set intersection where the intersection is only revealed to one Querier,
//! built from Bloom filters and a correlated zero-sharing among the input parties.
//!
//! [approx] is the main module of this library.
#![warn(missing_docs)]

pub mod approx;
pub mod channel_utils;
pub mod cli_utils;
pub mod errors;
pub mod hash_utils;
pub mod secret_sharing;
pub mod set_utils;
pub mod stats;

pub use approx::PartyId;
