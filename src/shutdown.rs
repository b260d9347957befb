//! Stop signal for the server loop.

use tokio::sync::broadcast;

/// One handle per party; a trigger on any handle reaches every other one.
#[derive(Debug)]
pub struct Shutdown {
    fired: bool,
    notify: broadcast::Sender<()>,
    waiter: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new() -> Shutdown {
        let (notify, waiter) = broadcast::channel(1);
        Shutdown {
            fired: false,
            notify,
            waiter,
        }
    }

    /// Whether this handle has triggered or observed the signal.
    pub fn fired(&self) -> bool {
        self.fired
    }

    /// Resolves once some handle triggers, or once every trigger is gone.
    pub async fn wait(&mut self) {
        if !self.fired {
            // A closed or lagged channel ends the wait just like a signal.
            let _ = self.waiter.recv().await;
            self.fired = true;
        }
    }

    pub fn trigger(&mut self) {
        self.fired = true;
        let _ = self.notify.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Shutdown::new()
    }
}

impl Clone for Shutdown {
    fn clone(&self) -> Shutdown {
        Shutdown {
            fired: false,
            notify: self.notify.clone(),
            waiter: self.notify.subscribe(),
        }
    }
}
