//! Trade Submitter CLI
//!
//! Command-line interface for submitting market group intents.

use alloy::primitives::{Address, I256, U256};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trade_submitter::market::{GraphqlMarketSource, MarketSource};
use trade_submitter::observers::{AuditLogObserver, TracingObserver};
use trade_submitter::wallet::{RpcWalletClient, SecureWallet, PRIVATE_KEY_VAR};
use trade_submitter::quote::LiquidityPosition;
use trade_submitter::{
    quote, tokens, AllowanceTracker, Config, Error, Intent, LiquidityMode, MarketRef, PlanBuilder,
    Result, RpcConfig, SubmissionOrchestrator,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "trade-submit")]
#[command(about = "Submit trades and liquidity changes to prediction market groups")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an intent and wait for the outcome
    Submit {
        /// Path to the intent JSON file
        #[arg(short, long)]
        intent: PathBuf,

        /// Override the configured slippage tolerance (percent)
        #[arg(long)]
        slippage: Option<f64>,

        /// Build and print the call plan without sending anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the call plan for an intent from `owner`'s point of view
    Plan {
        /// Path to the intent JSON file
        #[arg(short, long)]
        intent: PathBuf,

        /// Account whose allowance gates the plan
        #[arg(long)]
        owner: Address,

        /// Override the configured slippage tolerance (percent)
        #[arg(long)]
        slippage: Option<f64>,
    },

    /// Read an ERC-20 allowance
    Allowance {
        #[arg(long)]
        token: Address,

        #[arg(long)]
        owner: Address,

        #[arg(long)]
        spender: Address,

        #[arg(long, default_value_t = 8453)]
        chain_id: u64,
    },

    /// Quote a trade and print the intent that would submit it
    QuoteTrade {
        #[arg(long, default_value_t = 8453)]
        chain_id: u64,

        /// Market group contract
        #[arg(long)]
        market_group: Address,

        #[arg(long)]
        market_id: u64,

        /// Target position size in base token units (negative = short)
        #[arg(long, allow_hyphen_values = true)]
        size: String,

        /// Existing position to resize; a size of 0 closes it
        #[arg(long)]
        position_id: Option<String>,
    },

    /// Quote a new liquidity position, or a change to an existing one
    QuoteLiquidity {
        #[arg(long, default_value_t = 8453)]
        chain_id: u64,

        /// Market group contract
        #[arg(long)]
        market_group: Address,

        #[arg(long)]
        market_id: u64,

        #[arg(long, allow_hyphen_values = true)]
        lower_tick: i32,

        #[arg(long, allow_hyphen_values = true)]
        upper_tick: i32,

        /// Collateral to deposit into a new position (base units)
        #[arg(long, conflicts_with = "position_id")]
        collateral: Option<String>,

        /// Existing position to modify
        #[arg(long, requires_all = ["liquidity", "liquidity_delta"])]
        position_id: Option<String>,

        /// Current liquidity of the position
        #[arg(long)]
        liquidity: Option<u128>,

        /// Collateral currently deposited in the position (base units)
        #[arg(long, default_value = "0")]
        deposited_collateral: String,

        /// `add` or `remove`
        #[arg(long, default_value = "add")]
        mode: String,

        /// Liquidity to add or remove
        #[arg(long)]
        liquidity_delta: Option<u128>,
    },

    /// Look up a market through the data API
    Market {
        #[arg(long, default_value_t = 8453)]
        chain_id: u64,

        #[arg(long)]
        market_group: Address,

        #[arg(long)]
        market_id: u64,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    let config = match cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Submit {
            intent,
            slippage,
            dry_run,
        } => {
            run_submit(&intent, with_slippage(config, slippage)?, dry_run).await?;
        }
        Commands::Plan {
            intent,
            owner,
            slippage,
        } => {
            run_plan(&intent, owner, with_slippage(config, slippage)?).await?;
        }
        Commands::Allowance {
            token,
            owner,
            spender,
            chain_id,
        } => {
            run_allowance(&config, token, owner, spender, chain_id).await?;
        }
        Commands::QuoteTrade {
            chain_id,
            market_group,
            market_id,
            size,
            position_id,
        } => {
            run_quote(&config, chain_id, market_group, market_id, &size, position_id).await?;
        }
        Commands::QuoteLiquidity {
            chain_id,
            market_group,
            market_id,
            lower_tick,
            upper_tick,
            collateral,
            position_id,
            liquidity,
            deposited_collateral,
            mode,
            liquidity_delta,
        } => {
            let market = open_market(&config, chain_id, market_group, market_id).await?;
            let wallet = read_only_client(&config, Address::ZERO, chain_id);

            let intent = match (position_id, liquidity, liquidity_delta) {
                (Some(id), Some(liquidity), Some(delta)) => {
                    let position = LiquidityPosition {
                        id: parse_amount("position id", &id)?,
                        lower_tick,
                        upper_tick,
                        liquidity,
                        deposited_collateral: parse_amount(
                            "deposited collateral",
                            &deposited_collateral,
                        )?,
                    };
                    let mode = match mode.as_str() {
                        "add" => LiquidityMode::Add,
                        "remove" => LiquidityMode::Remove,
                        other => {
                            return Err(Error::InvalidArgument(format!(
                                "Invalid mode '{}': expected add or remove",
                                other
                            )))
                        }
                    };
                    let quote =
                        quote::quote_modify_liquidity(&wallet, &market, &position, mode, delta)
                            .await?;
                    println!("{}", serde_json::to_string_pretty(&quote)?);
                    quote.into_intent(market, &position)
                }
                (None, _, _) => {
                    let collateral = collateral.ok_or_else(|| {
                        Error::InvalidArgument("--collateral is required for a new position".into())
                    })?;
                    let collateral = parse_amount("collateral", &collateral)?;
                    let quote = quote::quote_create_liquidity(
                        &wallet, &market, collateral, lower_tick, upper_tick,
                    )
                    .await?;
                    println!("{}", serde_json::to_string_pretty(&quote)?);
                    quote.into_intent(market)
                }
                _ => {
                    return Err(Error::InvalidArgument(
                        "--position-id needs --liquidity and --liquidity-delta".into(),
                    ))
                }
            };
            println!("{}", serde_json::to_string_pretty(&intent)?);
        }
        Commands::Market {
            chain_id,
            market_group,
            market_id,
        } => {
            let source = market_source(&config)?;
            let market = source.market(chain_id, market_group, market_id).await?;
            println!("{}", serde_json::to_string_pretty(&market)?);
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn with_slippage(mut config: Config, slippage: Option<f64>) -> Result<Config> {
    if let Some(percent) = slippage {
        config.submission.slippage_percent = percent;
        config.validate()?;
    }
    Ok(config)
}

fn load_intent(path: &Path) -> Result<Intent> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidArgument(format!("Failed to read {}: {}", path.display(), e))
    })?;
    Ok(Intent::from_json(serde_json::from_str(&content)?)?)
}

fn read_only_client(config: &Config, account: Address, chain_id: u64) -> RpcWalletClient {
    RpcWalletClient::read_only(
        account,
        RpcConfig::from_env(),
        chain_id,
        config.submission.receipt_poll_interval(),
    )
}

fn market_source(config: &Config) -> Result<GraphqlMarketSource> {
    GraphqlMarketSource::new(
        config.api.graphql_url.clone(),
        std::time::Duration::from_secs(config.api.request_timeout_secs),
    )
}

async fn run_submit(path: &Path, config: Config, dry_run: bool) -> Result<()> {
    let intent = load_intent(path)?;
    let signer = SecureWallet::from_env(PRIVATE_KEY_VAR)?;
    let owner = signer.address();

    tracing::info!(
        intent = intent.label(),
        chain_id = intent.chain_id(),
        %owner,
        slippage = %config.submission.tolerance(),
        dry_run,
        "Starting submission"
    );

    if dry_run {
        return run_plan(path, owner, config).await;
    }

    let wallet = RpcWalletClient::new(
        signer,
        RpcConfig::from_env(),
        intent.chain_id(),
        config.submission.receipt_poll_interval(),
    );

    let mut orchestrator = SubmissionOrchestrator::new(Arc::new(wallet), config.submission.clone())
        .with_observer(Arc::new(TracingObserver));
    if let Some(log_path) = &config.audit_log_path {
        orchestrator = orchestrator.with_observer(Arc::new(AuditLogObserver::new(log_path)));
    }
    let orchestrator = Arc::new(orchestrator);

    let on_interrupt = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && !on_interrupt.cancel() {
            tracing::warn!("Interrupt ignored: the transaction is already on its way");
        }
    });

    let state = orchestrator.submit(intent).await?;
    println!("{}", serde_json::to_string_pretty(&state)?);

    match state.error {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

async fn run_plan(path: &Path, owner: Address, config: Config) -> Result<()> {
    let intent = load_intent(path)?;
    let market = *intent.market();
    let tolerance = config.submission.tolerance();
    let required = intent.required_collateral(tolerance);

    let approval = if intent.requires_collateral(tolerance) {
        let wallet = read_only_client(&config, owner, market.chain_id);
        let tracker = AllowanceTracker::new(Arc::new(wallet));
        Some(
            tracker
                .check_allowance(
                    market.collateral_asset,
                    owner,
                    market.address,
                    market.chain_id,
                    required,
                )
                .await?,
        )
    } else {
        None
    };

    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    let plan = PlanBuilder::new(config.submission.deadline_window()).build(
        &intent,
        approval.as_ref(),
        tolerance,
        now,
    )?;

    println!(
        "Collateral required: {}",
        tokens::registry().display(market.chain_id, &market.collateral_asset, required)
    );
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn run_allowance(
    config: &Config,
    token: Address,
    owner: Address,
    spender: Address,
    chain_id: u64,
) -> Result<()> {
    let tracker = AllowanceTracker::new(Arc::new(read_only_client(config, owner, chain_id)));
    let state = tracker
        .check_allowance(token, owner, spender, chain_id, U256::ZERO)
        .await?;

    println!(
        "Allowance: {}",
        tokens::registry().display(chain_id, &token, state.current_allowance)
    );
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

async fn run_quote(
    config: &Config,
    chain_id: u64,
    market_group: Address,
    market_id: u64,
    size: &str,
    position_id: Option<String>,
) -> Result<()> {
    let size = I256::from_dec_str(size)
        .map_err(|e| Error::InvalidArgument(format!("Invalid size '{}': {}", size, e)))?;
    let market = open_market(config, chain_id, market_group, market_id).await?;

    // Quotes are plain reads, so any account will do
    let wallet = read_only_client(config, Address::ZERO, chain_id);

    let intent = match position_id {
        Some(id) => {
            let position_id = parse_amount("position id", &id)?;
            let quote = quote::quote_modify_trade(&wallet, &market, position_id, size).await?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
            quote.into_intent(market, position_id, size)
        }
        None => {
            let quote = quote::quote_open_trade(&wallet, &market, size).await?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
            quote.into_intent(market, size)
        }
    };

    println!("{}", serde_json::to_string_pretty(&intent)?);
    Ok(())
}

/// Look up a market and refuse settled or expired ones
async fn open_market(
    config: &Config,
    chain_id: u64,
    market_group: Address,
    market_id: u64,
) -> Result<MarketRef> {
    let info = market_source(config)?
        .market(chain_id, market_group, market_id)
        .await?;
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    if !info.is_open(now) {
        return Err(Error::InvalidArgument(format!(
            "Market {} is settled or past its end time",
            market_id
        )));
    }
    Ok(info.market_ref())
}

fn parse_amount(what: &str, value: &str) -> Result<U256> {
    U256::from_str_radix(value, 10)
        .map_err(|e| Error::InvalidArgument(format!("Invalid {} '{}': {}", what, value, e)))
}
