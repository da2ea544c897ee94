use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health))
            .route("/wallets", web::post().to(handlers::create_wallet))
            .route("/wallets/{address}/balance", web::get().to(handlers::get_balance))
            .route("/wallets/{address}/transactions", web::get().to(handlers::get_wallet_transactions))
            .route("/transactions", web::post().to(handlers::send_transaction))
            .route("/admin/fund", web::post().to(handlers::fund_wallet))
            .route("/blocks", web::get().to(handlers::list_blocks))
            .route("/blocks/{index}", web::get().to(handlers::get_block))
            .route("/chain/validate", web::get().to(handlers::validate_chain))
    );
}
