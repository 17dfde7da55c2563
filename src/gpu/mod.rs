//! Runtime layer: environment and architecture classification, the device context, and
//! memory allocation on top of it.

pub mod arch;
pub mod context;
pub mod memory;
pub mod sandbox;
