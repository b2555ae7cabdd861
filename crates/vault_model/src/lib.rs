//! Pure model of the vault dashboard core
//! No I/O, no unwrap/panic, all functions total

pub mod math;
pub mod state;
pub mod reconcile;
pub mod transitions;
pub mod helpers;
pub mod policy;
pub mod format;

// Re-export commonly used types
pub use alloy_primitives::{Address, B256, U256};
pub use state::*;
pub use reconcile::*;
pub use transitions::*;
pub use helpers::*;
pub use policy::*;
