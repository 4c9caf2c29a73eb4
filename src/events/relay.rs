//! Single fan-out unit relaying task progress into the event sink.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::types::{CalcEvent, EventSink, TaskProgress};

/// Spawn the relay and return the sender task run loops report progress on.
///
/// The channel is unbounded so a slow sink never stalls a run loop. The relay exits once
/// every sender has been dropped.
pub fn spawn_progress_relay(
    sink: Arc<dyn EventSink>,
) -> (mpsc::UnboundedSender<TaskProgress>, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<TaskProgress>();
    let handle = tokio::spawn(async move {
        while let Some(progress) = receiver.recv().await {
            sink.publish(CalcEvent::TaskProgress(progress));
        }
        debug!("progress relay stopped");
    });
    (sender, handle)
}
