//! Change notifications from the mapper to the syncer.
//!
//! The channel holds at most one pending notification, so any number of
//! `notify` calls between two syncer wakes collapse into one.

use tokio::sync::mpsc;

pub fn change_channel() -> (ChangeSignal, ChangeReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ChangeSignal { tx }, ChangeReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct ChangeSignal {
    tx: mpsc::Sender<()>,
}

impl ChangeSignal {
    /// Never blocks; a full channel already carries a pending wake.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

#[derive(Debug)]
pub struct ChangeReceiver {
    rx: mpsc::Receiver<()>,
}

impl ChangeReceiver {
    /// Wait for the next notification. Returns `false` once every
    /// [`ChangeSignal`] has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Discard notifications that arrived during the debounce window.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}
