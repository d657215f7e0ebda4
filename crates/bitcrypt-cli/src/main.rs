//! bitcrypt: per-file hybrid encryption CLI
//!
//! Commands:
//!   keygen               - create public.key / private.key
//!   encrypt <path>       - file → <file>.enc, directory → <dir>_enc
//!   decrypt <path>       - <file>.enc → <file>, <dir>_enc → <dir> (else in place)
//!   info <file>          - show a container's clear header without unsealing
//!   config show          - display the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bitcrypt_core::config::BitcryptConfig;
use bitcrypt_core::BitcryptError;
use bitcrypt_crypto::{probe_container, CipherParams};
use bitcrypt_engine::{
    decrypt_file, decrypted_dir_path, decrypted_file_path, encrypt_file, encrypted_dir_path,
    encrypted_file_path, walk_decrypt, walk_encrypt, DecryptOptions, ProgressFn, WalkOptions,
    WalkReport,
};
use tokio_util::sync::CancellationToken;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "bitcrypt",
    version,
    about = "Encrypt files and directory trees to an age public key",
    long_about = "bitcrypt: per-file hybrid encryption. Each file gets a fresh AES key, \
                  sealed to your public key and stored in the file's own header."
)]
struct Cli {
    /// Path to bitcrypt.toml configuration file
    #[arg(long, short = 'c', env = "BITCRYPT_CONFIG", default_value = "bitcrypt.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides log.level
    #[arg(long, env = "BITCRYPT_LOG")]
    log: Option<String>,

    /// Log format; overrides log.format
    #[arg(long, env = "BITCRYPT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new key pair
    Keygen {
        /// Directory to write public.key / private.key into
        /// (default: keys.keys_dir, else keys/ next to the binary)
        #[arg(long, short = 'd')]
        dir: Option<PathBuf>,
        /// Replace existing key files
        #[arg(long)]
        force: bool,
    },

    /// Encrypt a file or a directory tree
    Encrypt {
        /// File or directory to encrypt
        path: PathBuf,
        /// Public key file (overrides discovery)
        #[arg(long, short = 'k')]
        key: Option<PathBuf>,
        /// Symmetric key size in bytes: 16, 24 or 32
        #[arg(long)]
        key_size: Option<u32>,
        /// Stream mode: cfb, ctr or ofb
        #[arg(long, short = 'm')]
        mode: Option<String>,
        /// Output path (default: <file>.enc or <dir>_enc)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Worker threads for directories (0 = one per CPU)
        #[arg(long, short = 'j')]
        workers: Option<usize>,
    },

    /// Decrypt a container or a directory tree of containers
    Decrypt {
        /// Container file or directory to decrypt
        path: PathBuf,
        /// Private key file (overrides discovery)
        #[arg(long, short = 'k')]
        key: Option<PathBuf>,
        /// Output path (default: strip .enc / _enc, else in place)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Worker threads for directories (0 = one per CPU)
        #[arg(long, short = 'j')]
        workers: Option<usize>,
    },

    /// Show the clear header of a container
    Info {
        file: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BitcryptConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(
        if config.log.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        },
    );
    init_logging(&level, &format);

    match cli.command {
        Commands::Keygen { dir, force } => cmd_keygen(&config, dir.as_deref(), force),
        Commands::Encrypt {
            path,
            key,
            key_size,
            mode,
            output,
            workers,
        } => {
            let params = CipherParams::from_raw(
                key_size.unwrap_or(config.cipher.key_size),
                mode.as_deref().unwrap_or(&config.cipher.mode),
            );
            cmd_encrypt(&config, &path, key.as_deref(), params, output.as_deref(), workers)
        }
        Commands::Decrypt {
            path,
            key,
            output,
            workers,
        } => cmd_decrypt(&config, &path, key.as_deref(), output.as_deref(), workers),
        Commands::Info { file } => cmd_info(&file),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── `bitcrypt keygen` ─────────────────────────────────────────────────────────

fn cmd_keygen(config: &BitcryptConfig, dir: Option<&Path>, force: bool) -> Result<()> {
    let dir = dir
        .map(Path::to_path_buf)
        .or_else(|| config.keys.keys_dir.clone())
        .unwrap_or_else(bitcrypt_secrets::default_keys_dir);

    let files = bitcrypt_secrets::generate_keypair(&dir, force)
        .with_context(|| format!("generating key pair in {}", dir.display()))?;

    println!("Key pair written:");
    println!("  public:  {}", files.public_key.display());
    println!("  private: {}", files.private_key.display());
    println!("  recipient: {}", files.recipient);
    println!();
    println!("Keep private.key secret; without it nothing encrypted to this key can be recovered.");
    Ok(())
}

// ── `bitcrypt encrypt` ────────────────────────────────────────────────────────

fn cmd_encrypt(
    config: &BitcryptConfig,
    path: &Path,
    key: Option<&Path>,
    params: CipherParams,
    output: Option<&Path>,
    workers: Option<usize>,
) -> Result<()> {
    let public = bitcrypt_secrets::find_public_key(key, &config.keys)
        .context("loading public key")?;
    tracing::debug!(source = %public.source, "public key resolved");

    if path.is_file() {
        let dest = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| encrypted_file_path(path));
        match encrypt_file(path, &dest, &public.key, params) {
            Ok(report) => {
                println!(
                    "{} → {} ({}, {} {})",
                    path.display(),
                    dest.display(),
                    fmt_bytes(report.bytes),
                    params.mode,
                    params.key_size.bytes() * 8,
                );
                Ok(())
            }
            Err(BitcryptError::AlreadyUpToDate(_)) => {
                println!("{} is already up to date", dest.display());
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("encrypting {}", path.display())),
        }
    } else if path.is_dir() {
        let dest = match output {
            Some(o) => o.to_path_buf(),
            None => encrypted_dir_path(path)?,
        };
        let (options, pb) = walk_options(config, workers, "encrypt");
        println!("Encrypting {} → {}", path.display(), dest.display());
        let report = walk_encrypt(path, &dest, &public.key, params, &options)
            .with_context(|| format!("encrypting tree: {}", path.display()))?;
        finish_walk(&report, "encrypted", &pb)
    } else {
        anyhow::bail!("path not found or not a file/directory: {}", path.display());
    }
}

// ── `bitcrypt decrypt` ────────────────────────────────────────────────────────

fn cmd_decrypt(
    config: &BitcryptConfig,
    path: &Path,
    key: Option<&Path>,
    output: Option<&Path>,
    workers: Option<usize>,
) -> Result<()> {
    let private = bitcrypt_secrets::find_private_key(key, &config.keys)
        .context("loading private key")?;
    tracing::debug!(source = %private.source, "private key resolved");

    if path.is_file() {
        let dest = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| decrypted_file_path(path));
        let options = DecryptOptions {
            restore_mtime: config.decrypt.restore_mtime,
        };
        match decrypt_file(path, &dest, &private.key, &options) {
            Ok(report) => {
                println!(
                    "{} → {} ({})",
                    path.display(),
                    dest.display(),
                    fmt_bytes(report.bytes)
                );
                Ok(())
            }
            Err(BitcryptError::AlreadyUpToDate(_)) => {
                println!("{} is already up to date", dest.display());
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("decrypting {}", path.display())),
        }
    } else if path.is_dir() {
        let dest = match output {
            Some(o) => o.to_path_buf(),
            None => decrypted_dir_path(path)?,
        };
        let (options, pb) = walk_options(config, workers, "decrypt");
        println!("Decrypting {} → {}", path.display(), dest.display());
        let report = walk_decrypt(path, &dest, &private.key, &options)
            .with_context(|| format!("decrypting tree: {}", path.display()))?;
        finish_walk(&report, "decrypted", &pb)
    } else {
        anyhow::bail!("path not found or not a file/directory: {}", path.display());
    }
}

fn walk_options(
    config: &BitcryptConfig,
    workers: Option<usize>,
    prefix: &str,
) -> (WalkOptions, ProgressBar) {
    let pb = make_progress_bar(prefix);
    let pb_clone = pb.clone();
    let progress: ProgressFn = Box::new(move |done, total, msg| {
        pb_clone.set_length(total);
        pb_clone.set_position(done);
        pb_clone.set_message(msg.to_string());
        if done == total {
            pb_clone.finish_and_clear();
        }
    });

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut options = WalkOptions::from_config(&config.walk, &config.decrypt);
    if let Some(n) = workers {
        options.workers = n;
    }
    options.progress = Some(progress);
    options.cancel = Some(cancel);
    (options, pb)
}

/// First Ctrl-C cancels `token` so the walk stops between files; a second
/// one exits at once.
fn cancel_on_ctrl_c(token: CancellationToken) {
    let spawned = std::thread::Builder::new()
        .name("bitcrypt-signal".into())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::warn!("Ctrl-C handling unavailable: {e}");
                    return;
                }
            };
            rt.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                eprintln!("\ninterrupted: finishing files in progress (Ctrl-C again to abort)");
                token.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        });
    if let Err(e) = spawned {
        tracing::warn!("Ctrl-C handling unavailable: {e}");
    }
}

fn finish_walk(report: &WalkReport, verb: &str, pb: &ProgressBar) -> Result<()> {
    pb.finish_and_clear();
    println!();
    println!("Done:");
    println!(
        "  {verb}: {} files ({})",
        report.processed.len(),
        fmt_bytes(report.bytes())
    );
    println!("  up to date: {} files", report.up_to_date);
    println!("  skipped:    {} entries", report.skipped);
    println!("  failed:     {} entries", report.failures.len());

    for (path, err) in &report.failures {
        eprintln!("  ✗ {}: {err}", path.display());
    }
    if report.cancelled {
        anyhow::bail!("cancelled before all files were processed");
    }
    if !report.failures.is_empty() {
        anyhow::bail!("{} entries failed", report.failures.len());
    }
    Ok(())
}

fn make_progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ── `bitcrypt info` ───────────────────────────────────────────────────────────

fn cmd_info(file: &Path) -> Result<()> {
    let header =
        probe_container(file).with_context(|| format!("reading header: {}", file.display()))?;
    let total = std::fs::metadata(file)
        .with_context(|| format!("stat: {}", file.display()))?
        .len();

    println!("{}", file.display());
    println!("  format:      bitcrypt container ({:#010x})", header.format_flag);
    println!("  sealed key:  {} bytes", header.sealed_len);
    println!("  payload:     {}", fmt_bytes(total - header.payload_offset()));
    println!("  modified at: {} (unix seconds)", header.modified_at);
    println!("  digest:      {}", header.content_digest);
    Ok(())
}

// ── `bitcrypt config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &BitcryptConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = config.to_toml().context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_encrypt_flags() {
        let cli = Cli::try_parse_from([
            "bitcrypt", "encrypt", "docs", "--mode", "ctr", "--key-size", "16", "-j", "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Encrypt {
                path,
                mode,
                key_size,
                workers,
                ..
            } => {
                assert_eq!(path, PathBuf::from("docs"));
                assert_eq!(mode.as_deref(), Some("ctr"));
                assert_eq!(key_size, Some(16));
                assert_eq!(workers, Some(4));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_global_log_flags() {
        let cli = Cli::try_parse_from([
            "bitcrypt",
            "--log",
            "debug",
            "--log-format",
            "json",
            "info",
            "a.enc",
        ])
        .unwrap();
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn fmt_bytes_units() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn failed_walk_is_an_error() {
        let pb = ProgressBar::hidden();
        let mut report = WalkReport::default();
        assert!(finish_walk(&report, "encrypted", &pb).is_ok());

        report.failures.push((
            PathBuf::from("x"),
            BitcryptError::Format("not an encrypted container".into()),
        ));
        assert!(finish_walk(&report, "encrypted", &pb).is_err());
    }

    #[test]
    fn cancelled_walk_is_an_error() {
        let report = WalkReport {
            cancelled: true,
            ..Default::default()
        };
        assert!(finish_walk(&report, "decrypted", &ProgressBar::hidden()).is_err());
    }

    #[test]
    fn empty_walk_clears_the_progress_bar() {
        let pb = make_progress_bar("encrypt");
        finish_walk(&WalkReport::default(), "encrypted", &pb).unwrap();
        assert!(pb.is_finished());
    }

    #[test]
    fn walk_options_carry_a_live_cancel_token() {
        let config = BitcryptConfig::default();
        let (options, pb) = walk_options(&config, Some(3), "encrypt");
        pb.finish_and_clear();
        assert_eq!(options.workers, 3);
        assert!(options.progress.is_some());
        assert!(options.cancel.as_ref().is_some_and(|c| !c.is_cancelled()));
    }
}
