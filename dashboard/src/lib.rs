//! Insurance vault dashboard core
//!
//! Chain reads are cached and polled by the [`scheduler`], vault positions
//! are reconciled in `vault_model`, and deposits/withdrawals are driven
//! by the [`flow`] engine behind a [`session::VaultSession`].

pub mod chain;
pub mod config;
pub mod flow;
pub mod queries;
pub mod read_cache;
pub mod scheduler;
pub mod session;
pub mod sim;
