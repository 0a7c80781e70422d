//! Database reconciliation.
//!
//! Keeps the song database in step with the audio files under the music
//! directory. A run is configured with a [`Mode`] and driven by
//! [`Reconciler::step`], usually through [`run`]:
//!
//! ```ignore
//! let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
//! let (control_tx, control_rx) = mpsc::unbounded_channel();
//! let engine = Reconciler::new(options, &config, collaborators, progress_tx)?;
//! let counters = reconcile::run(engine, control_rx).await?;
//! ```
//!
//! Progress and the final summary arrive on the progress channel as
//! [`ProgressMessage`]s.

mod counters;
mod engine;
mod mode;
mod protocol;
mod queue;
mod runner;

pub use counters::{Counter, Counters};
pub use engine::{Collaborators, ReconcileOptions, Reconciler, RunState, Step};
pub use mode::{Mode, Source};
pub use protocol::{ControlMessage, ProgressMessage};
pub use queue::{Job, JobQueue};
pub use runner::{forward_control_lines, run};
