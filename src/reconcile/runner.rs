//! Async driver for a [`Reconciler`].

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::warn;

use super::counters::Counters;
use super::engine::{Reconciler, Step};
use super::protocol::ControlMessage;
use crate::error::Result;

/// Drive `engine` to completion.
///
/// Pending control messages are applied before every step, and the task
/// yields between steps so other work on the runtime keeps moving. A closed
/// control channel is not a stop request.
pub async fn run(
    mut engine: Reconciler,
    mut control: mpsc::UnboundedReceiver<ControlMessage>,
) -> Result<Counters> {
    let mut control_open = true;
    loop {
        while control_open {
            match control.try_recv() {
                Ok(message) => engine.handle_control(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => control_open = false,
            }
        }

        if engine.step().await? == Step::Done {
            return Ok(engine.counters().clone());
        }
        tokio::task::yield_now().await;
    }
}

/// Forward control lines from `input` until it ends or the receiver goes
/// away. Malformed lines are logged and ignored.
pub async fn forward_control_lines<R>(input: R, control: mpsc::UnboundedSender<ControlMessage>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match line.parse::<ControlMessage>() {
                Ok(message) => {
                    if control.send(message).is_err() {
                        return;
                    }
                }
                Err(e) => warn!(target: "reconcile", error = %e, "Ignoring control line"),
            },
            Ok(None) => return,
            Err(e) => {
                warn!(target: "reconcile", error = %e, "Control input failed");
                return;
            }
        }
    }
}
