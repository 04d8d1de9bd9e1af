pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod optimizer;
pub mod payments;
pub mod pledges;
pub mod server;
pub mod settlement;
