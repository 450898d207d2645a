use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;

/// Repeating auto-save timer. At most one timer is armed per scheduler;
/// arming again cancels the previous one first.
///
/// The flush callback returns `Ok(true)` when a draft was flushed,
/// `Ok(false)` when there was nothing to flush yet (a draft without a
/// persisted id is skipped, not half-saved). A failed flush is not retried
/// until the next tick.
#[derive(Default)]
pub struct AutoSave {
    timer: Option<(Sender<()>, JoinHandle<()>)>,
}

impl AutoSave {
    pub fn new() -> AutoSave {
        Default::default()
    }

    pub fn start<F>(&mut self, interval: Duration, mut flush: F)
    where
        F: FnMut() -> Result<bool> + Send + 'static,
    {
        self.stop();

        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || loop {
            match rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => match flush() {
                    Ok(true) => tracing::debug!("auto-save flushed"),
                    Ok(false) => tracing::debug!("auto-save skipped, nothing to flush"),
                    Err(err) => tracing::warn!("auto-save flush failed: {err:#}"),
                },
                // stop signal, or the scheduler itself is gone
                _ => break,
            }
        });
        self.timer = Some((tx, handle));
    }

    pub fn start_minutes<F>(&mut self, interval_minutes: u64, flush: F)
    where
        F: FnMut() -> Result<bool> + Send + 'static,
    {
        self.start(Duration::from_secs(interval_minutes * 60), flush);
    }

    pub fn stop(&mut self) {
        if let Some((tx, handle)) = self.timer.take() {
            let _ = tx.send(());
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }
}

impl Drop for AutoSave {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::AutoSave;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn ticks_repeatedly_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let seen = ticks.clone();

        let mut autosave = AutoSave::new();
        autosave.start(Duration::from_millis(10), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });
        assert!(autosave.is_running());

        std::thread::sleep(Duration::from_millis(100));
        autosave.stop();
        assert!(!autosave.is_running());

        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "expected at least two ticks, got {after_stop}");

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn restart_replaces_the_previous_timer() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut autosave = AutoSave::new();
        let counter = first.clone();
        autosave.start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });
        std::thread::sleep(Duration::from_millis(35));

        let counter = second.clone();
        autosave.start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });
        let first_after_restart = first.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(60));

        // the old timer stopped at restart, the new one kept ticking
        assert_eq!(first.load(Ordering::SeqCst), first_after_restart);
        assert!(second.load(Ordering::SeqCst) >= 2);
        autosave.stop();
    }

    #[test]
    fn flush_errors_do_not_kill_the_timer() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let seen = ticks.clone();

        let mut autosave = AutoSave::new();
        autosave.start(Duration::from_millis(10), move || {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(anyhow::anyhow!("disk full"))
            } else {
                Ok(false)
            }
        });
        std::thread::sleep(Duration::from_millis(80));
        autosave.stop();

        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }
}
