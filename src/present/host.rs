// SPDX-License-Identifier: MPL-2.0

//! Scheduling work onto the host's UI thread.

use std::sync::{Mutex, PoisonError};

use calloop::{LoopHandle, channel};
use tracing::warn;

/// A unit of work to run on the host thread.
pub type HostTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks on the host's UI thread, in submission order.
pub trait HostScheduler: Send + Sync {
    fn schedule(&self, task: HostTask);
}

/// Runs every task immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl HostScheduler for InlineScheduler {
    fn schedule(&self, task: HostTask) {
        task();
    }
}

/// Queues tasks onto a calloop event loop; they run during its dispatch.
pub struct CalloopScheduler {
    tx: Mutex<channel::Sender<HostTask>>,
}

impl CalloopScheduler {
    pub fn new<Data>(handle: &LoopHandle<'_, Data>) -> eyre::Result<Self> {
        let (tx, rx) = channel::channel::<HostTask>();
        handle
            .insert_source(rx, |event, _, _| match event {
                channel::Event::Msg(task) => task(),
                channel::Event::Closed => {}
            })
            .map_err(|err| eyre::eyre!("{}", err))?;

        Ok(Self { tx: Mutex::new(tx) })
    }
}

impl HostScheduler for CalloopScheduler {
    fn schedule(&self, task: HostTask) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if tx.send(task).is_err() {
            warn!("event loop is gone, dropping host task");
        }
    }
}

impl std::fmt::Debug for CalloopScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalloopScheduler").finish_non_exhaustive()
    }
}
