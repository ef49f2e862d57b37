//! Cancellation shared between the worker pool and every in-flight runner.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const INTERRUPT_NOTICE: &str = "interrupted: stopping in-flight commands";

/// Cloneable flag; once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Cancel this token on SIGINT.
    ///
    /// Running commands are then interrupted and killed once their grace
    /// period runs out. Only one handler can be installed per process; later calls fail.
    pub fn install_sigint_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            if !token.is_cancelled() {
                eprintln!("{INTERRUPT_NOTICE}");
            }
            token.cancel();
        })
    }
}
