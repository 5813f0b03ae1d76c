pub mod backoff;
pub mod clock;
pub mod cursor;
pub mod dispatcher;
pub mod format;
pub mod poller;
pub mod sequencer;

pub use backoff::{RetryPolicy, RetryState};
pub use clock::{Clock, RecordingClock, TokioClock};
pub use cursor::{CursorStore, FileCursorStore, MemoryCursorStore};
pub use dispatcher::{DeliveryOutcome, DispatchReport, Dispatcher};
pub use poller::{CycleReport, Poller, Route, Schedule};

use tokio::sync::watch;

/// Shutdown flag shared by the poll loop and the dispatchers.
pub type ShutdownRx = watch::Receiver<bool>;

pub(crate) fn is_shutdown(rx: &ShutdownRx) -> bool {
    *rx.borrow()
}

/// Resolves once shutdown is requested. A dropped sender means nobody can
/// request shutdown any more, so this then never resolves.
pub(crate) async fn shutdown_requested(rx: &mut ShutdownRx) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
