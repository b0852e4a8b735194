//! vdrfe entry point.
//!
//! ```text
//! vdrfe                        Connect to the configured host
//! vdrfe vdr.local              Connect to vdr.local:37890
//! vdrfe --port 2004            Override the server port
//! vdrfe --config <path>        Load a custom config TOML
//! vdrfe --gen-config           Write default config to stdout
//! vdrfe --osd pam              Write the OSD to a PAM snapshot
//! vdrfe --keys-from-stdin      Send key names typed on stdin
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vdrfe_client::config::ClientConfig;
use vdrfe_client::input::spawn_stdin_keys;
use vdrfe_client::player::ProcessPlayer;
use vdrfe_client::renderer::{self, RendererKind};
use vdrfe_client::session::Session;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vdrfe", about = "Remote playback front-end for VDR-style servers")]
struct Cli {
    /// Server host (overrides the config file).
    host: Option<String>,

    /// Server port (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vdrfe.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// OSD renderer (overrides the config file).
    #[arg(long, value_enum)]
    osd: Option<RendererKind>,

    /// Read key names from stdin, one per line.
    #[arg(long)]
    keys_from_stdin: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then apply command-line overrides.
    let mut config = ClientConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    config.input.keys_from_stdin |= cli.keys_from_stdin;

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vdrfe v{}", env!("CARGO_PKG_VERSION"));
    info!("server: {}", config.server_address());
    info!("player: {} {}", config.player.command, config.player.args.join(" "));

    let osd_kind = match cli.osd {
        Some(kind) => kind,
        None => config.osd.renderer.parse()?,
    };
    info!("osd renderer: {osd_kind:?}");

    let player = ProcessPlayer::new(config.player.clone());
    let osd = renderer::build(osd_kind, Path::new(&config.osd.snapshot_path));
    let keys = if config.input.keys_from_stdin {
        Some(spawn_stdin_keys()?)
    } else {
        None
    };

    let mut session = Session::new(config, Box::new(player));
    if let Some(osd) = osd {
        session = session.with_renderer(osd);
    }
    if let Some(keys) = keys {
        session = session.with_keys(keys);
    }

    let report = session
        .run(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl-C received, shutting down");
        })
        .await?;

    info!("session {}", report.end);
    if !report.is_success() {
        error!("exiting with failure");
        std::process::exit(1);
    }
    Ok(())
}
