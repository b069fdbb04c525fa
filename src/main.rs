//! Lumen Vault - CLI
//!
//! Command-line interface for vault operations.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use lumen_vault::crypto::KdfParams;
use lumen_vault::progress::{CancelToken, ProgressSink};
use lumen_vault::vault::ImportRequest;
use lumen_vault::{MediaType, Vault};

#[derive(Parser)]
#[command(name = "lumen-vault")]
#[command(version = lumen_vault::VERSION)]
#[command(about = "Lumen Vault - local encrypted media vault")]
struct Cli {
    /// Vault path
    #[arg(short, long, default_value = "./vault")]
    vault: PathBuf,

    /// Password (prompted when omitted)
    #[arg(short, long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault
    Setup {
        /// PBKDF2 iteration count
        #[arg(long)]
        iterations: Option<u32>,
    },

    /// Check that the password unlocks the vault
    Status,

    /// Import photos or videos
    Import {
        /// Source files
        paths: Vec<PathBuf>,

        /// Treat sources as videos instead of photos
        #[arg(long)]
        video: bool,
    },

    /// List all entries
    List,

    /// Export an entry to a plaintext file
    Export {
        /// Entry ID
        id: Uuid,

        /// Output path
        output: PathBuf,
    },

    /// Rename an entry
    Rename {
        id: Uuid,
        new_name: String,
    },

    /// Toggle an entry's favorite flag
    Favorite {
        id: Uuid,
    },

    /// Delete an entry
    Delete {
        id: Uuid,

        /// Overwrite ciphertext with random bytes before unlinking
        #[arg(long)]
        secure: bool,
    },

    /// Verify the integrity of every stored entry
    Verify,

    /// Remove ciphertext files no catalog entry references
    Sweep,

    /// Show vault statistics
    Stats,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn read_password(cli_password: &Option<String>) -> anyhow::Result<String> {
    match cli_password {
        Some(p) => Ok(p.clone()),
        None => rpassword::prompt_password("Vault password: ").context("reading password"),
    }
}

fn open_unlocked(vault_path: &PathBuf, password: &Option<String>) -> anyhow::Result<Vault> {
    let vault = Vault::open(vault_path)?;
    let password = read_password(password)?;
    vault.unlock(&password).map_err(|e| {
        if let Some(hint) = e.recovery_suggestion() {
            anyhow::anyhow!("{} ({})", e, hint)
        } else {
            e.into()
        }
    })?;
    Ok(vault)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Setup { iterations } => {
            let vault = Vault::open(&cli.vault)?;
            let password = read_password(&cli.password)?;
            match iterations {
                Some(n) => vault.setup_with_params(&password, KdfParams::new(n)?)?,
                None => vault.setup(&password)?,
            }
            println!("🔐 Vault created at: {}", cli.vault.display());
            println!("   media/   - encrypted content");
            println!("   thumbs/  - encrypted previews");
        }

        Commands::Status => {
            let vault = open_unlocked(&cli.vault, &cli.password)?;
            let stats = vault.stats()?;
            println!("🔓 Vault unlocked ({} entries)", stats.total_entries);
            vault.lock()?;
        }

        Commands::Import { paths, video } => {
            let vault = open_unlocked(&cli.vault, &cli.password)?;
            let media_type = if video {
                MediaType::Video
            } else {
                MediaType::Photo
            };
            let requests: Vec<ImportRequest> = paths
                .iter()
                .map(|p| ImportRequest::from_path(p, media_type))
                .collect();

            let sink = ProgressSink::new(|p| {
                println!(
                    "  [{}/{}] {} ({}/{} bytes)",
                    p.items_processed, p.items_total, p.status, p.bytes_processed, p.bytes_total
                );
            });
            let entries = vault.import_items(&requests, Some(&sink), &CancelToken::new())?;
            for entry in &entries {
                println!("✅ {} -> {}", entry.filename, entry.id);
            }
            vault.lock()?;
        }

        Commands::List => {
            let vault = open_unlocked(&cli.vault, &cli.password)?;
            let entries = vault.entries()?;
            if entries.is_empty() {
                println!("📭 No entries in vault");
            } else {
                println!("📷 Entries ({}):", entries.len());
                println!("{:-<72}", "");
                for entry in entries {
                    let fav = if entry.favorite { "⭐" } else { "  " };
                    let kind = match entry.media_type {
                        MediaType::Photo => "photo",
                        MediaType::Video => "video",
                    };
                    println!(
                        "{} {} [{}] {} ({} bytes)",
                        fav, entry.id, kind, entry.filename, entry.file_size
                    );
                }
            }
            vault.lock()?;
        }

        Commands::Export { id, output } => {
            let vault = open_unlocked(&cli.vault, &cli.password)?;
            let written = vault.export_entry(id, &output)?;
            println!("📤 Exported {} bytes to {}", written, output.display());
            vault.lock()?;
        }

        Commands::Rename { id, new_name } => {
            let vault = open_unlocked(&cli.vault, &cli.password)?;
            vault.rename_entry(id, &new_name)?;
            println!("✅ Renamed {} to {}", id, new_name);
            vault.lock()?;
        }

        Commands::Favorite { id } => {
            let vault = open_unlocked(&cli.vault, &cli.password)?;
            let favorite = !vault.entry(id)?.favorite;
            vault.set_favorite(id, favorite)?;
            println!("{} {}", if favorite { "⭐" } else { "☆" }, id);
            vault.lock()?;
        }

        Commands::Delete { id, secure } => {
            let vault = open_unlocked(&cli.vault, &cli.password)?;
            vault.delete_entry(id, secure)?;
            println!("🗑️ Deleted {}", id);
            vault.lock()?;
        }

        Commands::Verify => {
            let vault = open_unlocked(&cli.vault, &cli.password)?;
            let report = vault.verify_entries()?;
            println!("Verified {}/{} entries", report.verified, report.total);
            if report.is_healthy() {
                println!("💚 Vault is healthy");
            } else {
                for issue in &report.issues {
                    println!("⚠️ {} ({}): {:?} - {}", issue.id, issue.filename, issue.kind, issue.detail);
                }
            }
            vault.lock()?;
        }

        Commands::Sweep => {
            let vault = open_unlocked(&cli.vault, &cli.password)?;
            let removed = vault.sweep_orphans()?;
            println!("🧹 Removed {} orphaned files", removed);
            vault.lock()?;
        }

        Commands::Stats => {
            let vault = open_unlocked(&cli.vault, &cli.password)?;
            let stats = vault.stats()?;
            println!("📊 Lumen Vault Statistics");
            println!("{:-<40}", "");
            println!("Entries:         {}", stats.total_entries);
            println!("Photos:          {}", stats.photos);
            println!("Videos:          {}", stats.videos);
            println!("Favorites:       {}", stats.favorites);
            println!("Media size:      {} KB", stats.media_bytes / 1024);
            println!("On-disk size:    {} KB", stats.disk_bytes / 1024);
            vault.lock()?;
        }
    }

    Ok(())
}
