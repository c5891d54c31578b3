//! Shared leaf types for the bridge workspace.
//!
//! ## Architecture
//!
//! - **common** (this crate): types every other crate needs, with no logic of their own
//! - **bridge-core**: the IPC bridge library
//! - **bridge-probe**: command-line application wiring the bridge to a host
//!
//! Keeping these types in a leaf crate lets error values cross crate boundaries
//! without pulling the bridge into the application's error module.

pub mod error;

pub use error::error_location::ErrorLocation;
