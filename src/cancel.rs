use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::WatchError;

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Routes Ctrl-C to this flag. The first signal asks running work to stop after the
    /// current item; a second one terminates the process.
    pub fn install_ctrlc_handler(&self) -> Result<(), WatchError> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            if flag.is_cancelled() {
                std::process::exit(130);
            }
            flag.cancel();
        })
        .map_err(|err| WatchError::SignalHandler(err.to_string()))
    }
}
