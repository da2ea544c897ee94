use std::path::PathBuf;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use utxo_ledger::api;
use utxo_ledger::blockchain::Ledger;
use utxo_ledger::config::AppConfig;

#[derive(Parser)]
#[command(name = "utxo_ledger")]
#[command(about = "Single-node UTXO ledger with a REST API")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to bind the HTTP server to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the HTTP server to
    #[arg(short, long)]
    port: Option<u16>,

    /// Leading zero bits required of every block hash
    #[arg(long)]
    difficulty_bits: Option<u32>,
}

/// Loads the configuration and applies command line flags on top
fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bits) = cli.difficulty_bits {
        config.ledger.difficulty_bits = bits;
    }

    config.validate()?;
    Ok(config)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health,
        api::handlers::create_wallet,
        api::handlers::get_balance,
        api::handlers::get_wallet_transactions,
        api::handlers::send_transaction,
        api::handlers::fund_wallet,
        api::handlers::list_blocks,
        api::handlers::get_block,
        api::handlers::validate_chain
    ),
    components(
        schemas(
            api::schema::TxInputResponse,
            api::schema::TxOutputResponse,
            api::schema::TransactionResponse,
            api::schema::BlockResponse,
            api::schema::BlockSummaryResponse,
            api::schema::ErrorResponse,
            api::handlers::HealthResponse,
            api::handlers::WalletResponse,
            api::handlers::BalanceResponse,
            api::handlers::SendRequest,
            api::handlers::SendResponse,
            api::handlers::FundWalletRequest,
            api::handlers::FundWalletResponse,
            api::handlers::ValidateResponse
        )
    ),
    tags(
        (name = "ledger", description = "UTXO ledger API endpoints")
    ),
    info(
        title = "UTXO Ledger API",
        version = "0.1.0",
        description = "A single-node UTXO ledger with proof-of-work",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Mining the genesis block can take a while at high difficulty
    let ledger = web::Data::new(Ledger::new(&config.ledger)?);

    info!(
        "Starting HTTP server at http://{}:{}",
        config.server.host, config.server.port
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(ledger.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
