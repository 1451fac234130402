/*!
 * Tessera CLI - credential tooling and a local load simulator
 */

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use rand::Rng;
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;
use tessera::{
    backend::{
        transport::redact_uri, BackendType, Command, KeyValueClient, DocumentClient,
        MemoryDocumentDriver, MemoryKeyValueDriver, StaticCredentialStore, TransportSecurity,
    },
    cli_style::{
        print_error, print_info, print_success, print_warning, section_header, tier_table,
        usage_table, Icons, Theme,
    },
    config::LogLevel,
    error::{EXIT_FAILURE, EXIT_SUCCESS},
    logging, ConnectionManager, CredentialCodec, EncryptedConnectionString, Error,
    ManagerConfig, MetricsRegistry, Tier,
};
use tokio::task::JoinSet;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(version, about = "Multi-tenant database connection manager", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (equivalent to log level debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a connection string with TESSERA_ENCRYPTION_KEY
    Encrypt {
        /// Plaintext connection URI
        uri: String,
    },

    /// Decrypt a stored connection string
    Decrypt {
        /// Stored form (v1:...)
        ciphertext: String,
    },

    /// Show how a connection string would be treated, without connecting
    CheckUri {
        /// Plaintext connection URI
        uri: String,
    },

    /// Print the effective tier limits
    Tiers {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a short load against in-memory backends and report usage
    Simulate(SimulateArgs),
}

#[derive(Args)]
struct SimulateArgs {
    /// Number of tenants
    #[arg(long, default_value = "3")]
    tenants: usize,

    /// Operations per tenant and backend
    #[arg(long, default_value = "50")]
    ops: usize,

    /// Tier every tenant runs under
    #[arg(long, default_value = "free")]
    tier: Tier,

    /// Add a tenant whose backend fails every command
    #[arg(long)]
    failing_tenant: bool,

    /// Print the Prometheus exposition afterwards
    #[arg(long)]
    metrics: bool,
}

fn main() {
    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let tessera_error = e.downcast_ref::<Error>();
            let hint = match tessera_error {
                Some(Error::Config(_)) if std::env::var(tessera::credential::KEY_ENV).is_err() => {
                    Some("set TESSERA_ENCRYPTION_KEY (64 hex characters or a passphrase)")
                }
                Some(Error::Encryption(_)) => {
                    Some("check the key, or list retired keys in TESSERA_PREVIOUS_ENCRYPTION_KEYS")
                }
                _ => None,
            };
            print_error(&format!("{:#}", e), hint);
            tessera_error.map_or(EXIT_FAILURE, Error::exit_code)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => ManagerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ManagerConfig::default(),
    }
    .with_env_overrides()?;
    if cli.verbose {
        config.logging.level = LogLevel::Debug;
    }

    match cli.command {
        Commands::Encrypt { uri } => {
            redact_uri(&uri).map_err(Error::from)?;
            let transport = TransportSecurity::from_uri(&uri).map_err(Error::from)?;
            if config.require_tls && !transport.is_tls() {
                print_warning("plaintext connection string; it will be refused while TLS is required");
            }

            let codec = CredentialCodec::from_env()?;
            println!("{}", codec.encrypt(&uri)?);
        }

        Commands::Decrypt { ciphertext } => {
            let encrypted = EncryptedConnectionString::parse(ciphertext.trim())?;
            let codec = CredentialCodec::from_env()?;
            println!("{}", codec.decrypt(&encrypted)?.expose_secret());
        }

        Commands::CheckUri { uri } => {
            let redacted = redact_uri(&uri).map_err(Error::from)?;
            let transport = TransportSecurity::from_uri(&uri).map_err(Error::from)?;

            print_info(&format!("endpoint:  {}", Theme::header(&redacted)));
            print_info(&format!("transport: {}", transport));
            if transport.is_tls() {
                print_success(&format!("{} encrypted transport", Icons::LOCK));
            } else if config.require_tls {
                bail!("plaintext connection strings are refused while TLS is required");
            } else {
                print_warning("plaintext transport (refused when require_tls is on)");
            }
        }

        Commands::Tiers { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config.tiers)?);
            } else {
                println!("{}", tier_table(&config.tiers));
            }
        }

        Commands::Simulate(args) => {
            logging::init_logging(&config.logging)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(simulate(config, args))?;
        }
    }

    Ok(())
}

async fn simulate(config: ManagerConfig, args: SimulateArgs) -> anyhow::Result<()> {
    let mut key = [0u8; 32];
    rand::rng().fill(&mut key);
    let codec = CredentialCodec::new(key);
    let faulty_backend = BackendType::Custom("faulty_kv".to_string());

    let kv_driver = MemoryKeyValueDriver::new();
    let doc_driver = MemoryDocumentDriver::new();
    let faulty_driver = MemoryKeyValueDriver::with_backend_type(faulty_backend.clone());
    faulty_driver.set_fail_commands(true);

    let mut store = StaticCredentialStore::new();
    let tenants: Vec<String> = (0..args.tenants).map(|i| format!("tenant-{}", i)).collect();
    for (i, tenant) in tenants.iter().enumerate() {
        store = store
            .with(
                tenant,
                BackendType::KeyValue,
                codec.encrypt(&format!("rediss://kv.internal:6380/{}", i))?,
            )
            .with(
                tenant,
                BackendType::Document,
                codec.encrypt(&format!("mongodb+srv://docs.internal/{}", tenant.replace('-', "_")))?,
            );
    }
    if args.failing_tenant {
        store = store.with(
            "tenant-faulty",
            faulty_backend.clone(),
            codec.encrypt("rediss://faulty.internal:6380/0")?,
        );
    }

    let manager = ConnectionManager::builder()
        .config(config)
        .driver(Arc::new(kv_driver.clone()))
        .driver(Arc::new(doc_driver.clone()))
        .driver(Arc::new(faulty_driver))
        .credentials(Arc::new(store))
        .codec(codec)
        .metrics(MetricsRegistry::new()?)
        .build()?;
    let _reaper = manager.spawn_idle_reaper();

    let mut tasks = JoinSet::new();
    for tenant in &tenants {
        for op in 0..args.ops {
            let kv = KeyValueClient::new(manager.clone(), tenant.as_str(), args.tier);
            let docs = DocumentClient::new(manager.clone(), tenant.as_str(), args.tier);
            tasks.spawn(async move {
                kv.incr("requests").await?;
                kv.set(&format!("session:{}", op), "active", None).await?;
                docs.insert_one("events", &serde_json::json!({ "seq": op }))
                    .await?;
                Ok::<_, Error>(())
            });
        }
    }

    let (mut succeeded, mut failed) = (0usize, 0usize);
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(()) => succeeded += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!(error = %e, "Simulated operation failed");
            }
        }
    }

    let mut rejected = 0usize;
    if args.failing_tenant {
        for _ in 0..args.ops {
            let outcome = manager
                .execute_with_circuit_breaker("tenant-faulty", faulty_backend.clone(), args.tier, "get", |conn| {
                    Box::pin(async move { Ok(conn.execute(Command::new("GET").arg("k")).await?) })
                })
                .await;
            if let Err(Error::CircuitOpen { .. }) = outcome {
                rejected += 1;
            }
        }
    }

    section_header("Usage");
    let mut rows = Vec::new();
    for meta in manager.all_connection_metadata().await {
        let stats = manager
            .pool_stats(&meta.tenant_id, meta.backend_type.clone())
            .await;
        let circuit = manager
            .circuit_status(&meta.tenant_id, meta.backend_type.clone())
            .await
            .map(|status| status.state);
        rows.push((meta, stats, circuit));
    }
    println!("{}", usage_table(&rows));

    section_header("Summary");
    print_info(&format!(
        "{} tasks succeeded, {} failed, {} physical connections opened",
        succeeded,
        failed,
        kv_driver.stats().connects() + doc_driver.stats().connects()
    ));
    if args.failing_tenant {
        print_info(&format!(
            "{} calls to tenant-faulty rejected by its circuit breaker",
            rejected
        ));
    }

    if args.metrics {
        section_header("Metrics");
        println!("{}", manager.metrics().await?);
    }

    let closed = manager.close_all().await;
    print_success(&format!("closed {} pools", closed));
    Ok(())
}
