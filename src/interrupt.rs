//! Interrupt handling: a process-wide watcher that fails running pipelines
//! when the process receives SIGINT.

use std::sync::{Mutex, Once, OnceLock};

use tracing::warn;

use crate::error::{PipelineError, PipelineResult};

type KillSender = flume::Sender<PipelineResult<()>>;

static WATCHERS: OnceLock<Mutex<Vec<KillSender>>> = OnceLock::new();
static INSTALL: Once = Once::new();

/// Registers a pipeline's kill sender with the interrupt watcher. The OS
/// handler is installed once per process; on SIGINT every registered
/// pipeline receives an interrupt error and stale senders are pruned.
pub(crate) fn notify_on_interrupt(tx: KillSender) {
    WATCHERS
        .get_or_init(|| Mutex::new(Vec::new()))
        .lock()
        .unwrap()
        .push(tx);

    INSTALL.call_once(|| {
        let result = ctrlc::set_handler(|| {
            if let Some(watchers) = WATCHERS.get() {
                watchers
                    .lock()
                    .unwrap()
                    .retain(|tx| tx.try_send(Err(PipelineError::Interrupted)).is_ok());
            }
        });
        if let Err(err) = result {
            warn!("could not install interrupt handler: {}", err);
        }
    });
}
