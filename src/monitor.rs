//! Watches the page and reports unread-count changes.
//!
//! One `ChangeMonitor` owns at most one observation session. A session is a
//! tokio task that waits on the mutation stream and two deadlines: the
//! debounce timer, rearmed by every mutation batch, and the retry timer used
//! while the page is still loading. Each role holds a single deadline, so
//! rescheduling replaces it instead of stacking.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::config::DetectorConfig;
use crate::detect::SignalExtractor;
use crate::document::{Document, MutationObserver, ObserveOptions};
use crate::error::{BadgeError, BadgeResult};
use crate::signal::UnreadSignal;

pub type UpdateCallback = Box<dyn FnMut(UnreadSignal) + Send + 'static>;

type Subscriber = Arc<Mutex<Option<UpdateCallback>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Quiet period after the last mutation before a pass runs.
    pub debounce: Duration,
    /// Spacing between initial detection attempts.
    pub retry_interval: Duration,
    /// Initial detection passes, the first included, before giving up and
    /// reporting `Absent`.
    pub max_attempts: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            debounce: Duration::from_millis(500),
            retry_interval: Duration::from_secs(1),
            max_attempts: 10,
        }
    }
}

struct Session {
    cancel: watch::Sender<bool>,
    subscriber: Subscriber,
    task: JoinHandle<()>,
}

pub struct ChangeMonitor {
    document: Arc<dyn Document>,
    extractor: Arc<SignalExtractor>,
    config: MonitorConfig,
    session: Option<Session>,
}

impl ChangeMonitor {
    pub fn new(
        document: Arc<dyn Document>,
        extractor: SignalExtractor,
        config: MonitorConfig,
    ) -> Self {
        ChangeMonitor {
            document,
            extractor: Arc::new(extractor),
            config,
            session: None,
        }
    }

    pub fn from_config(document: Arc<dyn Document>, config: &DetectorConfig) -> BadgeResult<Self> {
        let extractor = SignalExtractor::from_config(config)?;
        Ok(Self::new(document, extractor, config.monitor_config()))
    }

    /// Start observing and report every change of the unread signal to
    /// `on_update`. Any running session is destroyed first.
    ///
    /// Must be called from within a tokio runtime. `on_update` runs while the
    /// session's subscriber lock is held and must not call back into the
    /// monitor.
    ///
    /// On error nothing is left attached and the monitor stays uninitialized.
    pub fn init<F>(&mut self, on_update: F) -> BadgeResult<()>
    where
        F: FnMut(UnreadSignal) + Send + 'static,
    {
        self.destroy();

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            log::error!("[monitor] cannot start without a runtime: {}", e);
            BadgeError::NoRuntime(e.to_string())
        })?;

        let observer = self
            .document
            .observe(observe_options(self.extractor.label_attribute()))
            .map_err(|e| {
                log::error!("[monitor] failed to attach observer: {}", e);
                BadgeError::from(e)
            })?;

        let callback: UpdateCallback = Box::new(on_update);
        let subscriber: Subscriber = Arc::new(Mutex::new(Some(callback)));
        let mut watcher = Watcher {
            document: self.document.clone(),
            extractor: self.extractor.clone(),
            config: self.config,
            subscriber: subscriber.clone(),
            last_delivered: None,
            attempts: 0,
            debounce: None,
            retry: None,
        };
        watcher.attempt();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = runtime.spawn(watcher.run(observer, cancel_rx));

        self.session = Some(Session {
            cancel: cancel_tx,
            subscriber,
            task,
        });
        log::info!("[monitor] observing document");
        Ok(())
    }

    /// Stop observing. Pending timers are dropped and the callback is
    /// released; it will not fire again once this returns. Safe to call
    /// repeatedly or before `init`.
    pub fn destroy(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let _ = session.cancel.send(true);
        lock(&session.subscriber).take();
        session.task.abort();
        log::debug!("[monitor] destroyed");
    }

    pub fn is_observing(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for ChangeMonitor {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn observe_options(label_attribute: &str) -> ObserveOptions {
    ObserveOptions {
        child_list: true,
        subtree: true,
        attributes: true,
        attribute_filter: Some(vec![label_attribute.to_string()]),
        character_data: true,
        title: true,
    }
}

fn lock(subscriber: &Subscriber) -> MutexGuard<'_, Option<UpdateCallback>> {
    subscriber.lock().unwrap_or_else(|e| e.into_inner())
}

async fn fire_at(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

struct Watcher {
    document: Arc<dyn Document>,
    extractor: Arc<SignalExtractor>,
    config: MonitorConfig,
    subscriber: Subscriber,
    last_delivered: Option<UnreadSignal>,
    attempts: u32,
    debounce: Option<Instant>,
    retry: Option<Instant>,
}

impl Watcher {
    async fn run(mut self, mut observer: MutationObserver, mut cancel: watch::Receiver<bool>) {
        let mut stream_open = true;
        loop {
            let debounce = self.debounce;
            let retry = self.retry;
            if !stream_open && debounce.is_none() && retry.is_none() {
                break;
            }

            tokio::select! {
                _ = cancel.changed() => break,
                batch = observer.next_batch(), if stream_open => match batch {
                    Some(records) => self.on_mutations(records.len()),
                    None => {
                        log::warn!("[monitor] mutation stream closed by document");
                        stream_open = false;
                    }
                },
                _ = fire_at(debounce), if debounce.is_some() => self.on_debounce(),
                _ = fire_at(retry), if retry.is_some() => self.attempt(),
            }
        }
        log::debug!("[monitor] session ended");
    }

    /// One initial detection attempt. A count ends the retry phase; after
    /// the last attempt an empty page is reported as `Absent`.
    fn attempt(&mut self) {
        self.retry = None;
        self.attempts += 1;
        match self.detect() {
            Some(signal @ UnreadSignal::Count(_)) => self.deliver(signal),
            _ if self.attempts >= self.config.max_attempts => {
                log::info!(
                    "[monitor] no unread count after {} attempts",
                    self.attempts
                );
                self.deliver(UnreadSignal::Absent);
            }
            _ => self.retry = Some(Instant::now() + self.config.retry_interval),
        }
    }

    fn on_mutations(&mut self, records: usize) {
        log::trace!("[monitor] {} mutation(s), debouncing", records);
        self.debounce = Some(Instant::now() + self.config.debounce);
    }

    fn on_debounce(&mut self) {
        self.debounce = None;
        match self.detect() {
            Some(signal @ UnreadSignal::Count(_)) => {
                self.retry = None;
                self.deliver(signal);
            }
            // While retries are pending they own the first `Absent`.
            Some(UnreadSignal::Absent) if self.retry.is_none() => {
                self.deliver(UnreadSignal::Absent);
            }
            _ => {}
        }
    }

    /// Run the extractor. Faults are logged and reported as `None`.
    fn detect(&self) -> Option<UnreadSignal> {
        let document = self.document.as_ref();
        match catch_unwind(AssertUnwindSafe(|| self.extractor.find(document))) {
            Ok(Ok(signal)) => Some(signal),
            Ok(Err(e)) => {
                log::warn!("[monitor] detection failed: {}", e);
                None
            }
            Err(_) => {
                log::error!("[monitor] detection panicked, session continues");
                None
            }
        }
    }

    fn deliver(&mut self, signal: UnreadSignal) {
        if self.last_delivered.as_ref() == Some(&signal) {
            return;
        }
        let mut subscriber = lock(&self.subscriber);
        let Some(callback) = subscriber.as_mut() else {
            return;
        };
        log::debug!("[monitor] unread signal is now {}", signal);
        self.last_delivered = Some(signal.clone());
        if catch_unwind(AssertUnwindSafe(|| callback(signal))).is_err() {
            log::error!("[monitor] update callback panicked");
        }
    }
}
