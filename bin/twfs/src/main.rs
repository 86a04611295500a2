//! twfs - mount a Twitter account as a filesystem.
//!
//! Provides commands for:
//! - Mounting the authenticated account at a local directory
//! - Unmounting it again
//! - Writing a configuration template
//! - Checking which account the configured credentials belong to

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use twfs_fs::render_profile;
use twfs_net::{HttpsTransport, RestClient, Session};

use crate::config::{default_config_path, expand_tilde, load_config, Config, CONFIG_TEMPLATE};

/// Twitter filesystem CLI.
#[derive(Parser)]
#[command(name = "twfs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.twfs/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the account as a local filesystem (blocks until unmounted)
    Mount {
        /// Mount point path (default: mount.mount_point from the config)
        mount_point: Option<PathBuf>,

        /// Mount read-only
        #[arg(long)]
        read_only: bool,

        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,

        /// Seconds a cached entry stays fresh
        #[arg(long)]
        cache_timeout: Option<u64>,
    },

    /// Unmount a twfs filesystem
    Unmount {
        /// Mount point path
        mount_point: PathBuf,
    },

    /// Initialize twfs configuration
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show the account the configured credentials belong to
    Whoami,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;

    match cli.command {
        Commands::Mount {
            mount_point,
            read_only,
            allow_other,
            cache_timeout,
        } => {
            let mut config = load_config(&cli.config).context("Failed to load configuration")?;
            if let Some(mount_point) = mount_point {
                config.mount.mount_point = mount_point;
            }
            config.mount.read_only |= read_only;
            config.mount.allow_other |= allow_other;
            if let Some(secs) = cache_timeout {
                config.mount.cache_timeout_secs = secs;
            }
            cmd_mount(config)
        }

        Commands::Unmount { mount_point } => cmd_unmount(&mount_point),

        Commands::Init { force } => cmd_init(&cli.config, force),

        Commands::Whoami => {
            let config = load_config(&cli.config).context("Failed to load configuration")?;
            cmd_whoami(&config)
        }
    }
}

/// Verifies the configured credentials and returns the session.
fn connect(config: &Config) -> Result<Session> {
    let credentials = config.credentials().context("Incomplete credentials")?;
    let transport =
        HttpsTransport::new(&config.api.transport).context("Failed to create HTTPS transport")?;
    let client = RestClient::new(&config.api, credentials, transport);

    info!(base_url = %config.api.base_url, "Verifying credentials");
    Session::establish(Arc::new(client)).context("Failed to establish session")
}

fn cmd_mount(config: Config) -> Result<()> {
    if config.mount.mount_point.as_os_str().is_empty() {
        anyhow::bail!("No mount point given and none configured under [mount]");
    }

    let session = connect(&config)?;
    println!(
        "Mounting @{} at {:?}",
        session.handle(),
        config.mount.mount_point
    );

    twfs_fs::ops::mount(&session, config.mount).context("Mount failed")?;
    Ok(())
}

fn cmd_unmount(mount_point: &Path) -> Result<()> {
    let mount_point = expand_tilde(mount_point);
    info!("Unmounting {:?}", mount_point);
    twfs_fs::ops::unmount(&mount_point).context("Unmount failed")?;
    println!("Unmounted {:?}", mount_point);
    Ok(())
}

fn cmd_whoami(config: &Config) -> Result<()> {
    let session = connect(config)?;
    print!("{}", render_profile(session.account()));
    Ok(())
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    let config_file = match expand_tilde(config_path) {
        path if path.as_os_str().is_empty() => default_config_path(),
        path => path,
    };

    if config_file.exists() && !force {
        anyhow::bail!(
            "Configuration already exists at {:?}. Use --force to overwrite.",
            config_file
        );
    }

    if let Some(dir) = config_file.parent() {
        std::fs::create_dir_all(dir).context("Failed to create config directory")?;
    }
    std::fs::write(&config_file, CONFIG_TEMPLATE).context("Failed to write config file")?;
    restrict_permissions(&config_file)?;

    println!("Initialized twfs configuration at {:?}", config_file);
    println!("Fill in the [credentials] section before mounting.");
    Ok(())
}

/// The config holds secrets; keep it owner-only.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .context("Failed to restrict config file permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_mount_flags() {
        let cli = Cli::try_parse_from([
            "twfs",
            "-vv",
            "mount",
            "/mnt/tw",
            "--read-only",
            "--cache-timeout",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Mount {
                mount_point,
                read_only,
                allow_other,
                cache_timeout,
            } => {
                assert_eq!(mount_point, Some(PathBuf::from("/mnt/tw")));
                assert!(read_only);
                assert!(!allow_other);
                assert_eq!(cache_timeout, Some(5));
            }
            _ => panic!("expected mount"),
        }
    }

    #[test]
    fn test_init_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        cmd_init(&path, false).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, CONFIG_TEMPLATE);

        // Refuses to clobber without --force
        assert!(cmd_init(&path, false).is_err());
        cmd_init(&path, true).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_mount_requires_mount_point() {
        let err = cmd_mount(Config::default()).unwrap_err();
        assert!(err.to_string().contains("No mount point"));
    }
}
