//! Background idle-connection reaper

use tokio::task::JoinHandle;

/// Handle to the background reaper task
///
/// The task stops when the handle is dropped or [`stop`](Self::stop) is
/// called.
#[derive(Debug)]
pub struct ReaperHandle {
    handle: JoinHandle<()>,
}

impl ReaperHandle {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    /// Stop the reaper
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
