use aa_userop::config::{load_network_config, parse_addr, NetworkConfig};
use aa_userop::contracts::{
    EntryPointHandle, OfflineEntryPoint, ProviderChain, SimpleAccountConnector,
    SimpleAccountFactoryHandle,
};
use aa_userop::encoding::{self, parse_build_request};
use aa_userop::fees::{GasStationClient, ProviderFeeOracle};
use aa_userop::gas::Overhead;
use aa_userop::provider::{EntryPointContract, FeeOracle, UserOperationSigner};
use aa_userop::signer::LocalUserOperationSigner;
use aa_userop::{BuilderConfig, Collaborators, UserOperationBuilder};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// Helper: with --json, stdout carries a single JSON object and all
// human-readable output goes to stderr.
macro_rules! outln {
    ($machine_mode:expr, $($arg:tt)*) => {{
        if $machine_mode {
            eprintln!($($arg)*);
        } else {
            println!($($arg)*);
        }
    }};
}

#[derive(Parser, Debug)]
#[command(name = "aa-userop", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the counterfactual smart account address (and deployment status).
    Account(AccountArgs),

    /// Build an unsigned UserOperation for one call and print it with its hash.
    Build(BuildArgs),

    /// Build a UserOperation for one call and sign it with the owner key.
    Sign(BuildArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Network config (chainId, rpc, entryPoint, factory, gas policy).
    #[arg(long, env = "AA_USEROP_CONFIG", default_value = "deployments/sepolia.json")]
    config: PathBuf,

    /// Override the chain RPC URL (otherwise uses the network config).
    #[arg(long, env = "AA_USEROP_RPC_URL")]
    rpc: Option<String>,

    /// Override the EntryPoint address from the network config.
    #[arg(long, env = "AA_USEROP_ENTRYPOINT")]
    entrypoint: Option<String>,

    /// Override the SimpleAccountFactory address from the network config.
    #[arg(long, env = "AA_USEROP_FACTORY")]
    factory: Option<String>,

    /// Smart account owner private key.
    ///
    /// Recommended: set via env var AA_USEROP_OWNER_PRIVATE_KEY.
    #[arg(long, env = "AA_USEROP_OWNER_PRIVATE_KEY", hide_env_values = true)]
    owner_private_key: Option<String>,

    /// Owner address, for read-only use without a private key.
    #[arg(long)]
    owner: Option<String>,

    /// CREATE2 salt for the smart account.
    #[arg(long, default_value_t = 0)]
    index: u64,

    /// Gas price multiplier in basis points (e.g. 15000 = 1.5x).
    ///
    /// Overrides gasMultiplierBps from the network config.
    #[arg(long, env = "AA_USEROP_GAS_MULTIPLIER_BPS")]
    gas_multiplier_bps: Option<u64>,

    /// Print a single JSON object to stdout; all other output goes to stderr.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct AccountArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Call to execute: `<to>,<value>[,<data>[,<gasLimit>]]`.
    ///
    /// Exactly one call is supported per operation; repeating the flag is rejected.
    #[arg(long = "call", required = true)]
    calls: Vec<String>,

    /// Use this nonce instead of reading it from the account.
    #[arg(long)]
    nonce: Option<String>,

    /// Compute the userOpHash locally instead of calling EntryPoint.getUserOpHash.
    #[arg(long, default_value_t = false)]
    offline_hash: bool,
}

/// Everything resolved from flags + network config before building.
struct Session {
    cfg: NetworkConfig,
    provider: Arc<Provider<Http>>,
    entry_point: Address,
    factory: Address,
    owner: Address,
    signer: Option<LocalUserOperationSigner>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        // Always write logs to stderr so stdout can be used for script-friendly outputs.
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Account(args) => cmd_account(args).await,
        Command::Build(args) => cmd_build(args, false).await,
        Command::Sign(args) => cmd_build(args, true).await,
    }
}

async fn cmd_account(args: AccountArgs) -> Result<()> {
    let machine_mode = args.common.json;
    let session = open_session(&args.common).await?;
    let builder = make_builder(&session, &args.common, true);

    let account = builder.resolve_account_address().await?;
    let deployed = builder.is_deployed().await?;

    if machine_mode {
        let out = serde_json::json!({
            "chainId": session.cfg.chain_id,
            "owner": encoding::fmt_address(session.owner),
            "smartAccount": encoding::fmt_address(account),
            "isDeployed": deployed,
        });
        println!("{}", out);
    }

    outln!(machine_mode, "chainId:        {}", session.cfg.chain_id);
    outln!(machine_mode, "entryPoint:     {:?}", session.entry_point);
    outln!(machine_mode, "factory:        {:?}", session.factory);
    outln!(machine_mode, "owner:          {:?}", session.owner);
    outln!(machine_mode, "smartAccount:   {:?}", account);
    outln!(machine_mode, "isDeployed:     {}", deployed);

    Ok(())
}

async fn cmd_build(args: BuildArgs, sign: bool) -> Result<()> {
    let machine_mode = args.common.json;

    // Rejected before the session so a batch never reaches the RPC.
    let request = parse_build_request(&args.calls, args.nonce.as_deref())?;

    let session = open_session(&args.common).await?;
    if sign && session.signer.is_none() {
        bail!("signing requires AA_USEROP_OWNER_PRIVATE_KEY (or --owner-private-key)");
    }
    let builder = make_builder(&session, &args.common, args.offline_hash);

    let mut op = builder
        .build_unsigned_operation(&request)
        .await
        .context("failed to build user operation")?;
    let user_op_hash = builder.compute_operation_hash(&op).await?;

    if let Some(signer) = session.signer.as_ref().filter(|_| sign) {
        let signature = builder.sign_operation_hash(&op, signer).await?;
        op = op.with_signature(signature);
    }

    if machine_mode {
        let out = serde_json::json!({
            "chainId": session.cfg.chain_id,
            "entryPoint": encoding::fmt_address(session.entry_point),
            "userOpHash": encoding::fmt_h256(user_op_hash),
            "userOperation": encoding::user_op_to_json(&op),
        });
        println!("{}", out);
    }

    let label = if sign { "signed" } else { "unsigned" };
    outln!(
        machine_mode,
        "UserOperation ({label}):\n{}",
        serde_json::to_string_pretty(&encoding::user_op_to_json(&op))?
    );
    outln!(
        machine_mode,
        "\nuserOpHash: {}",
        encoding::fmt_h256(user_op_hash)
    );

    Ok(())
}

async fn open_session(common: &CommonArgs) -> Result<Session> {
    let cfg = load_network_config(&common.config, common.rpc.clone())?;

    let provider =
        Provider::<Http>::try_from(cfg.rpc_url.as_str())?.interval(Duration::from_millis(350));

    let chain_id = u64::try_from(provider.get_chainid().await?)
        .map_err(|_| anyhow!("RPC returned a chain id that does not fit in u64"))?;
    if chain_id != cfg.chain_id {
        return Err(anyhow!(
            "chainId mismatch: network config has {}, RPC returned {}",
            cfg.chain_id,
            chain_id
        ));
    }

    let entry_point = match common.entrypoint.as_deref() {
        Some(s) => parse_addr(s).context("invalid --entrypoint address")?,
        None => cfg.entry_point,
    };
    let factory = match common.factory.as_deref() {
        Some(s) => parse_addr(s).context("invalid --factory address")?,
        None => cfg.factory,
    };

    let (signer, owner) = load_owner(common, chain_id)?;

    Ok(Session {
        cfg,
        provider: Arc::new(provider),
        entry_point,
        factory,
        owner,
        signer,
    })
}

fn load_owner(
    common: &CommonArgs,
    chain_id: u64,
) -> Result<(Option<LocalUserOperationSigner>, Address)> {
    if let Some(pk) = common.owner_private_key.as_deref() {
        let signer = LocalUserOperationSigner::from_private_key(pk, chain_id)?;
        let owner = signer.address();
        if let Some(expected) = common.owner.as_deref() {
            if parse_addr(expected).context("invalid --owner address")? != owner {
                bail!("--owner {expected} does not match the owner private key ({owner:?})");
            }
        }
        return Ok((Some(signer), owner));
    }

    let owner = common.owner.as_deref().ok_or_else(|| {
        anyhow!("missing AA_USEROP_OWNER_PRIVATE_KEY (or --owner-private-key), or pass --owner")
    })?;
    let owner = parse_addr(owner).context("invalid --owner address")?;
    Ok((None, owner))
}

fn make_builder(session: &Session, common: &CommonArgs, offline_hash: bool) -> UserOperationBuilder {
    let cfg = &session.cfg;
    let client = session.provider.clone();
    let bps = common.gas_multiplier_bps.unwrap_or(cfg.gas_multiplier_bps);

    let fees: Arc<dyn FeeOracle> = match cfg.gas_station_url.as_ref() {
        Some(url) => Arc::new(
            GasStationClient::new(HashMap::from([(cfg.chain_id, url.clone())]))
                .with_multiplier_bps(bps),
        ),
        None => Arc::new(ProviderFeeOracle::new(client.clone(), bps)),
    };

    let entry_point: Arc<dyn EntryPointContract> = if offline_hash {
        Arc::new(OfflineEntryPoint::new(session.entry_point, cfg.chain_id))
    } else {
        Arc::new(EntryPointHandle::new(session.entry_point, client.clone()))
    };

    let config = BuilderConfig::new(session.owner)
        .index(U256::from(common.index))
        .base_verification_gas_limit(cfg.base_verification_gas_limit);

    UserOperationBuilder::new(
        config,
        Collaborators {
            chain: Arc::new(ProviderChain::new(client.clone())),
            factory: Arc::new(SimpleAccountFactoryHandle::new(session.factory, client.clone())),
            accounts: Arc::new(SimpleAccountConnector::new(client)),
            entry_point,
            fees,
            pre_verification_gas: Arc::new(Overhead::default()),
        },
    )
}
