// API module
//
// HTTP surface over the ledger service

pub mod handlers;
pub mod routes;
pub mod schema;

pub use routes::configure_routes;
