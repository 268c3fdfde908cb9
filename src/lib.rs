pub mod config;
pub mod errors;
pub mod guard;
pub mod ledger;
pub mod server;
pub mod tokens;
