use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Sender};

use super::Shared;
use super::runtime::sweep_shared;
use crate::realm::Realm;

/// Background thread running periodic sweeps until stopped or until the
/// root realm goes away.
#[derive(Debug)]
pub struct Sweeper {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub(crate) fn spawn(shared: Arc<Shared>, root: Weak<Realm>, interval_ms: u64) -> Self {
        let (stop, stopped) = channel::bounded::<()>(1);
        let ticker = channel::tick(Duration::from_millis(interval_ms));
        let handle = std::thread::Builder::new()
            .name("mop-sweeper".into())
            .spawn(move || {
                tracing::debug!(target: "mop::sweep", interval_ms, "sweeper started");
                loop {
                    channel::select! {
                        recv(stopped) -> _ => break,
                        recv(ticker) -> _ => {
                            let Some(root) = root.upgrade() else { break };
                            sweep_shared(&shared, &root);
                        }
                    }
                }
                tracing::debug!(target: "mop::sweep", "sweeper stopped");
            });
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(target: "mop::sweep", error = %err, "cannot spawn sweeper thread");
                None
            }
        };
        Self { stop, handle }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
