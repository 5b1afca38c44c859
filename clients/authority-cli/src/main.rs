//! authority-cli - inspect directory blocks, admin logs and the replayed authority registry

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ledger_authority::{
    AdminOp, Authority, AuthorityRegistry, AuthorityView, Block, BlockEntry, ChainId,
    FileDirectoryStore, IdentityStatus, ReplayConfig, ReplayReport, Replayer, decode_admin_log,
};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding `dblock/<height>.blk` and `admin/<height>.log`
    #[arg(short, long, env = "AUTHORITY_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild the authority registry from genesis
    Replay {
        /// Replay heights 1..=N, capped at the last finalized height
        #[arg(long)]
        through: Option<u32>,

        /// Print the registry snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one authority after a full rebuild
    Status {
        /// Identity chain id (64 hex characters)
        chain_id: ChainId,
    },

    /// Decode an encoded block file
    DecodeBlock {
        file: PathBuf,
    },

    /// Decode an admin log file
    DecodeAdmin {
        file: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ledger_authority=info,authority_cli=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn open_store(cli: &Cli) -> Result<FileDirectoryStore> {
    FileDirectoryStore::open(&cli.data_dir)
        .with_context(|| format!("Failed to open data directory {}", cli.data_dir.display()))
}

fn replay_config() -> Result<ReplayConfig> {
    ReplayConfig::from_env().context("Invalid replay configuration")
}

fn status_label(status: IdentityStatus) -> colored::ColoredString {
    match status {
        IdentityStatus::FederatedServer => status.as_str().green(),
        IdentityStatus::AuditServer => status.as_str().cyan(),
        IdentityStatus::Pending
        | IdentityStatus::PendingFederatedServer
        | IdentityStatus::PendingAuditServer => status.as_str().yellow(),
    }
}

fn print_authority(authority: &Authority) {
    println!(
        "  {} {}",
        authority.identity_chain_id.to_string().cyan(),
        status_label(authority.status)
    );
    if let Some(key) = authority.signing_key() {
        println!("    Signing key:    {}", key);
    }
    if !authority.matryoshka_hash.is_zero() {
        println!("    Matryoshka:     {}", authority.matryoshka_hash);
    }
    for anchor in &authority.anchor_keys {
        println!(
            "    Anchor key:     {} type={} priority={} {}",
            anchor.chain,
            anchor.key_type,
            anchor.key_priority,
            hex::encode(&anchor.key)
        );
    }
}

fn print_report(report: &ReplayReport) {
    println!(
        "{} {} heights replayed ({} without admin log), {} ops applied",
        "Replayed:".green().bold(),
        report.heights_replayed,
        report.heights_without_log,
        report.ops_applied
    );
    if !report.skipped_ops.is_empty() {
        println!(
            "{}",
            format!("{} ops skipped:", report.skipped_ops.len()).yellow()
        );
        for skipped in &report.skipped_ops {
            println!(
                "  height {} #{} {} {}",
                skipped.height, skipped.index, skipped.kind, skipped.chain_id
            );
        }
    }
}

async fn rebuild(
    cli: &Cli,
    through: Option<u32>,
) -> Result<(AuthorityRegistry, Option<ReplayReport>)> {
    let store = open_store(cli)?;
    let config = replay_config()?;
    debug!(?config, data_dir = %cli.data_dir.display(), "Replaying authority registry");
    let replayer = Replayer::new(&store).with_config(config);

    match through {
        Some(target) => {
            let registry = replayer
                .rebuild_through(target)
                .await
                .with_context(|| format!("Replay through height {} failed", target))?;
            Ok((registry, None))
        }
        None => {
            let (registry, report) = replayer
                .rebuild_with_report()
                .await
                .context("Replay failed")?;
            Ok((registry, Some(report)))
        }
    }
}

async fn cmd_replay(cli: &Cli, through: Option<u32>, json: bool) -> Result<()> {
    let (registry, report) = rebuild(cli, through).await?;

    if json {
        let snapshot = serde_json::to_string_pretty(&registry.snapshot())?;
        println!("{}", snapshot);
        return Ok(());
    }

    if let Some(report) = &report {
        print_report(report);
    }
    println!(
        "{} height {}, server count {}",
        "Registry:".cyan().bold(),
        registry.height(),
        registry.server_count()
    );

    let federated = registry.federated_servers();
    println!("{}", format!("Federated servers ({}):", federated.len()).cyan());
    for authority in federated {
        print_authority(authority);
    }

    let audit = registry.audit_servers();
    println!("{}", format!("Audit servers ({}):", audit.len()).cyan());
    for authority in audit {
        print_authority(authority);
    }

    let pending = registry.iter().filter(|a| !a.status.is_server()).count();
    if pending > 0 {
        println!("{}", format!("{} pending identities", pending).yellow());
    }
    Ok(())
}

async fn cmd_status(cli: &Cli, chain_id: &ChainId) -> Result<()> {
    let (registry, _) = rebuild(cli, None).await?;

    let Some(authority) = registry.lookup(chain_id) else {
        println!("{}", format!("{} is not a known authority", chain_id).yellow());
        return Ok(());
    };

    println!("{} (height {})", "Authority:".cyan().bold(), registry.height());
    print_authority(authority);
    println!("    Federated:      {}", registry.is_federated(chain_id));
    println!("    Audit:          {}", registry.is_audit(chain_id));
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn cmd_decode_block(path: &Path) -> Result<()> {
    let data = read_file(path)?;
    let (block, rest) = Block::decode(&data).context("Failed to decode block")?;
    let header = &block.header;

    println!("{}", "Block:".cyan().bold());
    println!("  Chain id:         {}", header.chain_id);
    println!("  Height:           {}", header.height);
    println!("  Body hash:        {}", header.body_hash);
    println!("  Prev header hash: {}", header.prev_header_hash);
    println!("  Prev full hash:   {}", header.prev_full_hash);
    println!("  Objects:          {}", header.object_count);
    println!("  Body size:        {}", header.body_size);
    println!("  Header hash:      {}", block.header_hash());
    println!("  Full hash:        {}", block.hash());

    for (index, entry) in block.body.iter().enumerate() {
        let detail = match entry {
            BlockEntry::ServerIndexNumber(n) => format!("server index {}", n),
            BlockEntry::MinuteNumber(n) => format!("minute {}", n),
            BlockEntry::ChainCommit(c) => {
                format!("chain commit entry={} credits={}", c.entry_hash, c.credits)
            }
            BlockEntry::EntryCommit(c) => {
                format!("entry commit entry={} credits={}", c.entry_hash, c.credits)
            }
            BlockEntry::BalanceIncrease(b) => {
                format!("balance increase tx={} credits={}", b.tx_id, b.num_ec)
            }
        };
        println!("  [{}] {}", index, detail);
    }

    if !rest.is_empty() {
        println!(
            "{}",
            format!("{} trailing bytes after block", rest.len()).yellow()
        );
    }
    Ok(())
}

fn cmd_decode_admin(path: &Path) -> Result<()> {
    let data = read_file(path)?;
    let ops = decode_admin_log(&data).context("Failed to decode admin log")?;
    println!("{}", format!("Admin log ({} ops):", ops.len()).cyan().bold());
    for (index, op) in ops.iter().enumerate() {
        let detail = match op {
            AdminOp::MinuteMarker(minute) => format!("minute {}", minute),
            AdminOp::IncreaseServerCount(amount) => format!("+{}", amount),
            AdminOp::AddServerSigningKey { signing_key, .. } => format!("key {}", signing_key),
            AdminOp::AddAnchorKey { anchor, .. } => format!(
                "{} type={} priority={} {}",
                anchor.chain,
                anchor.key_type,
                anchor.key_priority,
                hex::encode(&anchor.key)
            ),
            AdminOp::SetMatryoshkaHash { hash, .. }
            | AdminOp::RevealMatryoshkaHash { hash, .. } => format!("hash {}", hash),
            AdminOp::DirectoryBlockSignature(_)
            | AdminOp::AddFederatedServer(_)
            | AdminOp::AddAuditServer(_)
            | AdminOp::RemoveServer(_) => String::new(),
        };
        let target = op
            .target_chain_id()
            .map(|id| id.to_string())
            .unwrap_or_default();
        println!("  [{}] {} {} {}", index, op.kind().to_string().green(), target, detail);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match &cli.command {
        Commands::Replay { through, json } => cmd_replay(&cli, *through, *json).await,
        Commands::Status { chain_id } => cmd_status(&cli, chain_id).await,
        Commands::DecodeBlock { file } => cmd_decode_block(file),
        Commands::DecodeAdmin { file } => cmd_decode_admin(file),
    }
}
