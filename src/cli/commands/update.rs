//! Database reconciliation command.

use anyhow::Context;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::UpdateArgs;
use crate::config;
use crate::itunes::{ItunesFields, ItunesSource};
use crate::organizer::Platform;
use crate::reconcile::{self, Collaborators, Mode, ReconcileOptions, Reconciler};

/// Run a reconciliation, reading control lines from stdin and writing
/// protocol lines to stdout.
pub fn cmd_update(rt: &Runtime, args: &UpdateArgs) -> anyhow::Result<()> {
    let config = config::load();

    let music_dir = args
        .music_dir
        .clone()
        .or_else(|| config.library.music_dir.clone())
        .context("no music directory: pass --music-dir or set library.music_dir")?;
    let database_path = args
        .db
        .clone()
        .unwrap_or_else(|| config.library.database_path.clone());
    let mode = match args.mode {
        Mode::Compact { .. } => Mode::Compact {
            check_new: args.check_new,
        },
        mode => mode,
    };

    let itunes: Arc<dyn ItunesSource> = match &args.itunes {
        Some(path) => Arc::new(ItunesFields::load(path)?),
        None => {
            if mode == Mode::UpdateFromItunes {
                warn!(target: "reconcile", "No iTunes export given, nothing will be imported");
            }
            Arc::new(ItunesFields::default())
        }
    };

    let options = ReconcileOptions {
        mode,
        music_dir,
        database_path,
        scan_dir: args.dir.clone(),
        platform: Platform::current(),
    };

    rt.block_on(async {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let engine = Reconciler::new(options, &config, Collaborators::lofty(itunes), progress_tx)?;

        tokio::spawn(reconcile::forward_control_lines(
            BufReader::new(tokio::io::stdin()),
            control_tx,
        ));
        let printer = tokio::spawn(async move {
            while let Some(message) = progress_rx.recv().await {
                println!("{message}");
            }
        });

        let counters = reconcile::run(engine, control_rx).await?;
        printer.await?;

        info!(
            target: "reconcile",
            processed = counters.get(reconcile::Counter::Processed),
            "Update finished"
        );
        Ok::<_, anyhow::Error>(())
    })
}
