//! Single-dispatcher loop shared by the fan-out variants.

use std::sync::Arc;

use tracing::{debug, error};

use crate::core::{AdmissionToken, QueueError, Shared, Strategy};
use crate::infra::storage::MonitorStorage;
use crate::runtime::Job;

/// How the dispatcher admits items before launching them.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Admission<'a> {
    /// Token acquired per item, held until its running slot is given back.
    pub token: Option<&'a dyn AdmissionToken>,
    /// Running bound checked against the running count.
    pub bound: Option<usize>,
}

/// Move items from `storage` to `launch` until drained or cancelled.
///
/// Per item: wait while paused, admit, acquire a permit, reserve a running
/// slot, then hand a job running the item to `launch`. Returns once nothing
/// launched by this dispatcher is running.
pub(crate) fn run_dispatcher<T, S, L>(
    shared: &Arc<Shared<T, S>>,
    storage: &MonitorStorage<T>,
    admission: Admission<'_>,
    mut launch: L,
) where
    T: Send + 'static,
    S: Strategy<T>,
    L: FnMut(Job) -> Result<(), QueueError>,
{
    let core = &shared.core;
    while core.wait_while_paused() {
        let Some(item) = core.next_item(storage) else {
            break;
        };
        let Some(item) = core.admit(item) else {
            continue;
        };

        let permit = match admission.token.map(|token| token.acquire(core.token())).transpose() {
            Ok(permit) => permit,
            Err(QueueError::Canceled) => {
                core.discard(vec![item]);
                break;
            }
            Err(e) => {
                error!(queue = %core.label(), error = %e, "admission token failed, stopping dispatch");
                core.discard(vec![item]);
                core.token().cancel();
                break;
            }
        };

        if !core.begin_run(admission.bound) {
            drop(permit);
            core.discard(vec![item]);
            break;
        }

        let runner = Arc::clone(shared);
        let job: Job = Box::new(move || runner.core.run_item(item, permit));
        if let Err(e) = launch(job) {
            error!(queue = %core.label(), error = %e, "failed to launch item");
            core.abort_run();
        }
    }
    debug!(queue = %core.label(), running = core.running(), "dispatcher draining in-flight items");
    core.wait_idle();
}
