//! Tandem headless runner.
//!
//! Drives a [`SyncCore`] against an in-memory host so two shells on one
//! machine can exercise a full handshake -> sync -> reconcile session:
//!
//! ```text
//!     tandem --role listener --project /tmp/proj --open /tmp/proj/a.rs --walk
//!     tandem --role scanner  --project /tmp/proj
//! ```

mod headless;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use headless::HeadlessHost;
use tandem_logging::{init_logging, LogConfig};
use tandem_protocol::{Caret, IdeFamily, Role, SyncConfig};
use tandem_sync::SyncCore;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Listener,
    Scanner,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Listener => Role::Listener,
            RoleArg::Scanner => Role::Scanner,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "tandem", about = "Headless editor-state sync runner")]
struct Args {
    /// Transport role for this instance
    #[arg(long, value_enum)]
    role: RoleArg,

    /// Project path shared with the partner instance
    #[arg(long, env = "TANDEM_PROJECT")]
    project: String,

    /// Human-readable IDE name exchanged in the handshake
    #[arg(long, default_value = "Tandem Headless")]
    ide_name: String,

    /// Prefer this port over the automatic scan
    #[arg(long)]
    custom_port: Option<u16>,

    /// Seed the in-memory host with open tabs (repeatable)
    #[arg(long = "open")]
    open_files: Vec<String>,

    /// Start unfocused (the partner drives this instance)
    #[arg(long)]
    unfocused: bool,

    /// Emit a synthetic caret walk across the seeded tabs every few seconds
    #[arg(long)]
    walk: bool,

    /// Mirror the full log filter to stderr
    #[arg(long, short)]
    verbose: bool,

    /// Also write logs under ~/.tandem/logs
    #[arg(long)]
    log_file: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(LogConfig {
        app_name: "tandem",
        verbose: args.verbose,
        log_to_file: args.log_file,
    })?;

    // Listener speaks family A, scanner family B; roles are fixed per
    // family so the pair never races for the same port.
    let family = match args.role {
        RoleArg::Listener => IdeFamily::A,
        RoleArg::Scanner => IdeFamily::B,
    };

    let mut config = SyncConfig::new(
        args.project.clone(),
        family,
        args.ide_name.clone(),
        args.role.into(),
    );
    if let Some(port) = args.custom_port {
        config.use_custom_port = true;
        config.custom_port = port;
    }
    config.auto_start_sync = true;

    info!(
        role = config.role.as_str(),
        project = %config.project_path,
        "starting headless runner"
    );

    let host = Arc::new(HeadlessHost::new(!args.unfocused, args.open_files.clone()));
    let core = SyncCore::new(config, Arc::clone(&host) as _);

    let walker = args.walk.then(|| {
        let sink = core.event_sink();
        let host = Arc::clone(&host);
        tokio::spawn(async move {
            let mut line = 0u32;
            let mut ticker = tokio::time::interval(Duration::from_secs(3));
            loop {
                ticker.tick().await;
                let tabs = host.tabs();
                if tabs.is_empty() {
                    continue;
                }
                let path = &tabs[line as usize % tabs.len()];
                info!(path = %path, line, "walk: moving caret");
                sink.caret_or_selection_changed(path, Caret::new(line, 0), None);
                line += 1;
            }
        })
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    if let Some(walker) = walker {
        walker.abort();
    }
    core.shutdown().await;
    Ok(())
}
