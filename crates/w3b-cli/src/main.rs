use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "w3b")]
#[command(about = "W3B reserve verification CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run one reserve reconciliation against the configured chain and ledger
    Reconcile {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Operator override: permit publishing fewer reserves than currently proven
        #[arg(long, default_value_t = false)]
        allow_reserve_decrease: bool,

        /// Publish and attest only; never mint
        #[arg(long = "no-mint", default_value_t = false)]
        no_mint: bool,

        /// Print the full JSON report instead of key=value lines
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Price reconciliation
    Price {
        #[command(subcommand)]
        cmd: PriceCmd,
    },

    /// Protocol state account
    State {
        #[command(subcommand)]
        cmd: StateCmd,
    },

    /// Offline commitment tools
    Commitment {
        #[command(subcommand)]
        cmd: CommitmentCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations
    Migrate,
}

#[derive(Subcommand)]
enum PriceCmd {
    /// Compare the on-chain price with the configured source and publish on drift
    Sync {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum StateCmd {
    /// Read and decode the protocol state account
    Show {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CommitmentCmd {
    /// Compute the commitment root over a serial list (one serial per line)
    Root {
        #[arg(long)]
        file: String,

        /// Also print the inclusion proof for this serial
        #[arg(long)]
        prove: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");
    commands::init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = w3b_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = w3b_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_serial_table={} has_audit_table={}",
                        s.ok, s.has_serial_table, s.has_audit_table
                    );
                }
                DbCmd::Migrate => {
                    w3b_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = w3b_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Reconcile {
            config_paths,
            allow_reserve_decrease,
            no_mint,
            json,
        } => {
            commands::reconcile::run_reserve(&config_paths, allow_reserve_decrease, no_mint, json)
                .await?;
        }

        Commands::Price { cmd } => match cmd {
            PriceCmd::Sync { config_paths, json } => {
                commands::reconcile::run_price(&config_paths, json).await?;
            }
        },

        Commands::State { cmd } => match cmd {
            StateCmd::Show { config_paths, json } => {
                commands::state::show(&config_paths, json).await?;
            }
        },

        Commands::Commitment { cmd } => match cmd {
            CommitmentCmd::Root { file, prove } => {
                commands::commitment::root(&file, prove.as_deref())?;
            }
        },
    }

    Ok(())
}
