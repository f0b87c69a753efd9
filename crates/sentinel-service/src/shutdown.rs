use std::path::PathBuf;
use tokio::sync::watch;

/// Cancellation passed into the scheduler loop.
///
/// Stop is requested either through [`ShutdownTrigger`] (signal handlers) or
/// by removing the sentinel file that the daemon writes at start.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
    sentinel: Option<PathBuf>,
}

pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new(sentinel: Option<PathBuf>) -> (ShutdownTrigger, Self) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Self { rx, sentinel })
    }

    pub fn should_stop(&self) -> bool {
        if *self.rx.borrow() {
            return true;
        }
        match &self.sentinel {
            Some(path) => !path.exists(),
            None => false,
        }
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_requests_stop() {
        let (trigger, signal) = ShutdownSignal::new(None);
        assert!(!signal.should_stop());
        trigger.trigger();
        assert!(signal.should_stop());
    }

    #[test]
    fn removing_sentinel_requests_stop() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = dir.path().join("daemon.sentinel");
        std::fs::write(&sentinel, b"running").unwrap();
        let (_trigger, signal) = ShutdownSignal::new(Some(sentinel.clone()));
        assert!(!signal.should_stop());
        std::fs::remove_file(&sentinel).unwrap();
        assert!(signal.should_stop());
    }
}
