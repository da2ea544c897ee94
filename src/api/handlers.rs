use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::schema::{BlockResponse, BlockSummaryResponse, ErrorResponse, TransactionResponse};
use crate::blockchain::chain::BlockchainError;
use crate::blockchain::crypto::CryptoError;
use crate::blockchain::transaction::TransactionError;
use crate::blockchain::{Ledger, LedgerError, SUBSIDY};

/// Shared ledger handle
pub type LedgerData = web::Data<Ledger>;

/// Maps a ledger error onto the HTTP status the client sees
fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::Crypto(
            CryptoError::InvalidAddress(_) | CryptoError::Decode(_) | CryptoError::InvalidPrivateKey(_),
        ) => StatusCode::BAD_REQUEST,
        LedgerError::Transaction(
            TransactionError::InsufficientFunds { .. } | TransactionError::InvalidAmount(_),
        ) => StatusCode::BAD_REQUEST,
        LedgerError::VerificationFailed(_) | LedgerError::KeyMismatch => StatusCode::BAD_REQUEST,
        LedgerError::Blockchain(BlockchainError::NotFound(_)) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &LedgerError) -> HttpResponse {
    let status = status_for(err);
    if status.is_server_error() {
        error!("Ledger request failed: {}", err);
    }

    HttpResponse::build(status).json(ErrorResponse {
        error: err.to_string(),
    })
}

fn blocking_failed() -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse {
        error: "Mining task was cancelled".to_string(),
    })
}

/// Response for the health endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Service health
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Response for the create wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// The wallet's address
    pub address: String,

    /// The wallet's private key (hex encoded)
    pub private_key: String,
}

/// Create a new wallet
///
/// Creates a new wallet with a random keypair.
/// The private key is not kept by the server and must be stored by the caller.
#[utoipa::path(
    post,
    path = "/api/v1/wallets",
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse)
    )
)]
pub async fn create_wallet(ledger: LedgerData) -> impl Responder {
    let wallet = ledger.create_wallet();

    HttpResponse::Created().json(WalletResponse {
        address: wallet.address,
        private_key: wallet.private_key,
    })
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
}

/// Get wallet balance
///
/// Sums the unspent outputs locked to the address
#[utoipa::path(
    get,
    path = "/api/v1/wallets/{address}/balance",
    responses(
        (status = 200, description = "Wallet balance retrieved successfully", body = BalanceResponse),
        (status = 400, description = "Invalid address", body = ErrorResponse)
    )
)]
pub async fn get_balance(ledger: LedgerData, address: web::Path<String>) -> impl Responder {
    let address = address.into_inner();

    match ledger.get_balance(&address) {
        Ok(balance) => HttpResponse::Ok().json(BalanceResponse { address, balance }),
        Err(err) => error_response(&err),
    }
}

/// Get wallet transactions
///
/// Returns every transaction with an output paying the address
#[utoipa::path(
    get,
    path = "/api/v1/wallets/{address}/transactions",
    responses(
        (status = 200, description = "Transactions retrieved successfully", body = Vec<TransactionResponse>),
        (status = 400, description = "Invalid address", body = ErrorResponse)
    )
)]
pub async fn get_wallet_transactions(ledger: LedgerData, address: web::Path<String>) -> impl Responder {
    match ledger.get_transactions_for(&address) {
        Ok(transactions) => {
            let body: Vec<TransactionResponse> =
                transactions.iter().map(TransactionResponse::from).collect();
            HttpResponse::Ok().json(body)
        }
        Err(err) => error_response(&err),
    }
}

/// Request for the send endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SendRequest {
    /// The sender's address
    pub from: String,

    /// The recipient's address
    pub to: String,

    /// The amount to transfer
    pub amount: u64,

    /// The sender's private key (hex encoded, for signing)
    pub private_key: String,
}

/// Response for the send endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SendResponse {
    pub message: String,

    /// The block holding the transfer
    pub block: BlockResponse,
}

/// Send funds
///
/// Selects the sender's unspent outputs, signs the transfer and mines it
/// into a new block before responding
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = SendRequest,
    responses(
        (status = 201, description = "Transaction mined", body = SendResponse),
        (status = 400, description = "Invalid request or insufficient funds", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn send_transaction(ledger: LedgerData, request: web::Json<SendRequest>) -> impl Responder {
    let request = request.into_inner();
    let ledger = ledger.into_inner();

    let result = web::block(move || {
        ledger.send(&request.from, &request.to, request.amount, &request.private_key)
    })
    .await;

    match result {
        Ok(Ok(block)) => HttpResponse::Created().json(SendResponse {
            message: "transaction mined".to_string(),
            block: BlockResponse::from(&block),
        }),
        Ok(Err(err)) => error_response(&err),
        Err(_) => blocking_failed(),
    }
}

/// Request for the fund wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct FundWalletRequest {
    /// The address to fund
    pub address: String,
}

/// Response for the fund wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct FundWalletResponse {
    pub address: String,

    /// The fixed coinbase reward
    pub amount: u64,

    pub block_hash: String,
}

/// Fund a wallet
///
/// Mines a block whose coinbase pays the fixed reward to the address
#[utoipa::path(
    post,
    path = "/api/v1/admin/fund",
    request_body = FundWalletRequest,
    responses(
        (status = 200, description = "Wallet funded successfully", body = FundWalletResponse),
        (status = 400, description = "Invalid address", body = ErrorResponse)
    )
)]
pub async fn fund_wallet(ledger: LedgerData, request: web::Json<FundWalletRequest>) -> impl Responder {
    let address = request.into_inner().address;
    let ledger = ledger.into_inner();
    let target = address.clone();

    match web::block(move || ledger.mine_reward(&target)).await {
        Ok(Ok(block)) => HttpResponse::Ok().json(FundWalletResponse {
            address,
            amount: SUBSIDY,
            block_hash: block.hash_hex(),
        }),
        Ok(Err(err)) => error_response(&err),
        Err(_) => blocking_failed(),
    }
}

/// List blocks
///
/// Returns a summary of every block, genesis first
#[utoipa::path(
    get,
    path = "/api/v1/blocks",
    responses(
        (status = 200, description = "Blocks listed successfully", body = Vec<BlockSummaryResponse>)
    )
)]
pub async fn list_blocks(ledger: LedgerData) -> impl Responder {
    match ledger.list_blocks() {
        Ok(summaries) => {
            let body: Vec<BlockSummaryResponse> =
                summaries.into_iter().map(BlockSummaryResponse::from).collect();
            HttpResponse::Ok().json(body)
        }
        Err(err) => error_response(&err),
    }
}

/// Get a block
///
/// Returns the full block at the given height
#[utoipa::path(
    get,
    path = "/api/v1/blocks/{index}",
    responses(
        (status = 200, description = "Block retrieved successfully", body = BlockResponse),
        (status = 400, description = "Invalid block index", body = ErrorResponse),
        (status = 404, description = "Block not found", body = ErrorResponse)
    )
)]
pub async fn get_block(ledger: LedgerData, index: web::Path<String>) -> impl Responder {
    let index = match index.parse::<usize>() {
        Ok(index) => index,
        Err(_) => {
            return HttpResponse::BadRequest().json(ErrorResponse {
                error: "invalid block index".to_string(),
            })
        }
    };

    match ledger.get_block(index) {
        Ok(block) => HttpResponse::Ok().json(BlockResponse::from(&block)),
        Err(err) => error_response(&err),
    }
}

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
}

/// Check if the blockchain is valid
///
/// Re-checks the proof-of-work and previous-hash link of every block
#[utoipa::path(
    get,
    path = "/api/v1/chain/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = ValidateResponse)
    )
)]
pub async fn validate_chain(ledger: LedgerData) -> impl Responder {
    match ledger.validate_chain() {
        Ok(status) => HttpResponse::Ok().json(ValidateResponse {
            valid: status.valid,
            length: status.length,
        }),
        Err(err) => error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::blockchain::Wallet;
    use crate::config::LedgerConfig;
    use actix_web::{test, App};

    fn ledger_for(owner: &Wallet) -> LedgerData {
        web::Data::new(
            Ledger::new(&LedgerConfig {
                genesis_address: owner.address().to_string(),
                genesis_memo: "Genesis Block".to_string(),
                difficulty_bits: 8,
            })
            .unwrap(),
        )
    }

    #[actix_web::test]
    async fn test_health_and_wallet_creation() {
        let owner = Wallet::new();
        let app = test::init_service(App::new().app_data(ledger_for(&owner)).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let body: HealthResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.status, "ok");

        let req = test::TestRequest::post().uri("/api/v1/wallets").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let wallet: WalletResponse = test::read_body_json(resp).await;
        assert_eq!(wallet.address.len(), 64);
        assert_eq!(wallet.private_key.len(), 64);
    }

    #[actix_web::test]
    async fn test_send_and_query() {
        let owner = Wallet::new();
        let recipient = Wallet::new();
        let app = test::init_service(App::new().app_data(ledger_for(&owner)).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions")
            .set_json(SendRequest {
                from: owner.address().to_string(),
                to: recipient.address().to_string(),
                amount: 1_500,
                private_key: hex::encode(owner.export_secret_key()),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let sent: SendResponse = test::read_body_json(resp).await;
        assert_eq!(sent.block.transactions.len(), 1);
        assert_eq!(sent.block.transactions[0].outputs[0].value, 1_500);

        let uri = format!("/api/v1/wallets/{}/balance", recipient.address());
        let req = test::TestRequest::get().uri(&uri).to_request();
        let balance: BalanceResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(balance.balance, 1_500);

        let uri = format!("/api/v1/wallets/{}/transactions", recipient.address());
        let req = test::TestRequest::get().uri(&uri).to_request();
        let transactions: Vec<TransactionResponse> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].id, sent.block.transactions[0].id);

        let req = test::TestRequest::get().uri("/api/v1/blocks").to_request();
        let blocks: Vec<BlockSummaryResponse> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].hash, sent.block.hash);

        let req = test::TestRequest::get().uri("/api/v1/chain/validate").to_request();
        let validation: ValidateResponse = test::call_and_read_body_json(&app, req).await;
        assert!(validation.valid);
        assert_eq!(validation.length, 2);
    }

    #[actix_web::test]
    async fn test_error_statuses() {
        let owner = Wallet::new();
        let recipient = Wallet::new();
        let app = test::init_service(App::new().app_data(ledger_for(&owner)).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions")
            .set_json(SendRequest {
                from: owner.address().to_string(),
                to: recipient.address().to_string(),
                amount: SUBSIDY + 1,
                private_key: hex::encode(owner.export_secret_key()),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(body.error.contains("Insufficient funds"));

        let req = test::TestRequest::get().uri("/api/v1/wallets/xyz/balance").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/api/v1/blocks/42").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().is_some_and(|message| message.contains("42")));

        let req = test::TestRequest::get().uri("/api/v1/blocks/first").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_fund_wallet() {
        let owner = Wallet::new();
        let target = Wallet::new();
        let app = test::init_service(App::new().app_data(ledger_for(&owner)).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/admin/fund")
            .set_json(FundWalletRequest {
                address: target.address().to_string(),
            })
            .to_request();
        let funded: FundWalletResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(funded.amount, SUBSIDY);
        assert_eq!(funded.block_hash.len(), 64);

        let req = test::TestRequest::get().uri("/api/v1/blocks/1").to_request();
        let block: BlockResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(block.hash, funded.block_hash);
        assert!(block.transactions[0].coinbase);
        assert_eq!(block.transactions[0].outputs[0].address, target.address().to_string());
    }
}
