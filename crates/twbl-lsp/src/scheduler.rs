//! Priority-aware debouncing for feature requests.
//!
//! Every request is keyed by `(type, document, position)`. A newer request
//! with the same key cancels the pending one, so only the latest survives a
//! debounce window. Critical requests run immediately; low-priority kinds
//! batch once enough of them queue up.
//!
//! Debouncing happens inline in the caller's task: `schedule` parks on a
//! timer that a replacement, a batch dispatch, `clear_document_requests` or
//! `flush_all` can trip early.

use futures::{
    channel::oneshot,
    future::{select, Either},
};
use parking_lot::Mutex;
use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use twbl_common::environment::Environment;
use twbl_syntax::Position;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestPriority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Diagnostics,
    Hover,
    SignatureHelp,
    Completion,
    Definition,
    References,
    CodeAction,
    DocumentSymbols,
    WorkspaceSymbols,
    SemanticTokens,
    Formatting,
    FoldingRanges,
}

impl RequestKind {
    #[must_use]
    pub fn priority(self) -> RequestPriority {
        match self {
            RequestKind::Diagnostics => RequestPriority::Critical,
            RequestKind::Hover | RequestKind::SignatureHelp => RequestPriority::High,
            RequestKind::Completion
            | RequestKind::Definition
            | RequestKind::References
            | RequestKind::CodeAction => RequestPriority::Medium,
            RequestKind::DocumentSymbols
            | RequestKind::WorkspaceSymbols
            | RequestKind::SemanticTokens
            | RequestKind::Formatting
            | RequestKind::FoldingRanges => RequestPriority::Low,
        }
    }

    #[must_use]
    pub fn enable_batching(self) -> bool {
        self.priority() == RequestPriority::Low
    }
}

/// Identity of a pending request. `position: None` stands for requests
/// that are global to the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub kind: RequestKind,
    pub uri: Url,
    pub position: Option<Position>,
}

impl RequestKey {
    #[must_use]
    pub fn global(kind: RequestKind, uri: Url) -> Self {
        Self {
            kind,
            uri,
            position: None,
        }
    }

    #[must_use]
    pub fn at(kind: RequestKind, uri: Url, position: Position) -> Self {
        Self {
            kind,
            uri,
            position: Some(position),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub high_delay: Duration,
    pub medium_delay: Duration,
    pub low_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Requests arriving within this window grow the delay.
    pub crowd_window: Duration,
    /// Requests arriving after this gap shrink the delay again.
    pub relax_window: Duration,
    pub batch_size: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            high_delay: Duration::from_millis(100),
            medium_delay: Duration::from_millis(175),
            low_delay: Duration::from_millis(400),
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(1000),
            crowd_window: Duration::from_millis(100),
            relax_window: Duration::from_millis(300),
            batch_size: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("request superseded or cancelled")]
    Cancelled,
}

enum Wake {
    Fire,
    Cancel,
}

struct Pending {
    seq: u64,
    kick: Option<oneshot::Sender<Wake>>,
}

#[derive(Default)]
struct Shared {
    seq: u64,
    pending: crate::HashMap<RequestKey, Pending>,
    history: crate::HashMap<(RequestKind, Url), (Instant, Duration)>,
}

pub struct RequestScheduler<E: Environment> {
    env: E,
    settings: Mutex<SchedulerSettings>,
    shared: Arc<Mutex<Shared>>,
}

impl<E: Environment> RequestScheduler<E> {
    pub fn new(env: E, settings: SchedulerSettings) -> Self {
        Self {
            env,
            settings: Mutex::new(settings),
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Replace the timing settings; pending requests keep the delays they
    /// were scheduled with.
    pub fn update_settings(&self, settings: SchedulerSettings) {
        *self.settings.lock() = settings;
    }

    /// Debounce and run `handler`. Returns `Err(Cancelled)` when a newer
    /// request with the same key arrives before the window elapses.
    pub async fn schedule<T, F, Fut>(&self, key: RequestKey, handler: F) -> Result<T, ScheduleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if key.kind.priority() == RequestPriority::Critical {
            return Ok(handler().await);
        }

        let settings = *self.settings.lock();
        let (kick_tx, kick_rx) = oneshot::channel();

        let (seq, delay) = {
            let mut shared = self.shared.lock();
            shared.seq += 1;
            let seq = shared.seq;

            let delay = next_delay(&settings, &mut shared, &key);

            if let Some(prev) = shared.pending.insert(
                key.clone(),
                Pending {
                    seq,
                    kick: Some(kick_tx),
                },
            ) {
                if let Some(kick) = prev.kick {
                    let _ = kick.send(Wake::Cancel);
                }
            }

            if key.kind.enable_batching() {
                let queued = shared
                    .pending
                    .keys()
                    .filter(|k| k.kind == key.kind)
                    .count();
                if queued >= settings.batch_size {
                    for (_, pending) in shared
                        .pending
                        .iter_mut()
                        .filter(|(k, _)| k.kind == key.kind)
                    {
                        if let Some(kick) = pending.kick.take() {
                            let _ = kick.send(Wake::Fire);
                        }
                    }
                }
            }

            (seq, delay)
        };

        let sleep = Box::pin(self.env.sleep(delay));
        let fire = match select(sleep, kick_rx).await {
            Either::Left(_) => true,
            Either::Right((Ok(Wake::Cancel), _)) => false,
            Either::Right(_) => true,
        };

        let still_current = {
            let shared = self.shared.lock();
            shared.pending.get(&key).map_or(false, |p| p.seq == seq)
        };

        if !fire || !still_current {
            return Err(ScheduleError::Cancelled);
        }

        let value = handler().await;

        {
            let mut shared = self.shared.lock();
            if shared.pending.get(&key).map_or(false, |p| p.seq == seq) {
                shared.pending.remove(&key);
            }
        }

        Ok(value)
    }

    /// Cancel every pending request for the document.
    pub fn clear_document_requests(&self, uri: &Url) {
        let mut shared = self.shared.lock();
        let keys: Vec<RequestKey> = shared
            .pending
            .keys()
            .filter(|k| &k.uri == uri)
            .cloned()
            .collect();

        for key in keys {
            if let Some(mut pending) = shared.pending.remove(&key) {
                if let Some(kick) = pending.kick.take() {
                    let _ = kick.send(Wake::Cancel);
                }
            }
        }
    }

    /// Fire every pending timer immediately and wait for the handlers to
    /// drain. Used at shutdown.
    pub async fn flush_all(&self) {
        {
            let mut shared = self.shared.lock();
            for pending in shared.pending.values_mut() {
                if let Some(kick) = pending.kick.take() {
                    let _ = kick.send(Wake::Fire);
                }
            }
        }

        while !self.shared.lock().pending.is_empty() {
            self.env.sleep(Duration::from_millis(5)).await;
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }
}

fn base_delay(settings: &SchedulerSettings, priority: RequestPriority) -> Duration {
    match priority {
        RequestPriority::Critical => Duration::ZERO,
        RequestPriority::High => settings.high_delay,
        RequestPriority::Medium => settings.medium_delay,
        RequestPriority::Low => settings.low_delay,
    }
}

/// Rapid repeats stretch the window (stability under typing bursts), calm
/// periods shrink it back toward the base latency.
fn next_delay(settings: &SchedulerSettings, shared: &mut Shared, key: &RequestKey) -> Duration {
    let now = Instant::now();
    let history_key = (key.kind, key.uri.clone());
    let base = base_delay(settings, key.kind.priority());

    let delay = match shared.history.get(&history_key) {
        None => base,
        Some(&(last, prev)) => {
            let since = now.saturating_duration_since(last);
            if since < settings.crowd_window {
                prev.mul_f64(1.5).min(settings.max_delay)
            } else if since > settings.relax_window {
                prev.mul_f64(0.7).max(settings.min_delay)
            } else {
                prev
            }
        }
    };

    if shared.history.len() >= 512 {
        shared
            .history
            .retain(|_, (last, _)| last.elapsed() < Duration::from_secs(60));
    }
    shared.history.insert(history_key, (now, delay));

    delay
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use twbl_common::environment::native::NativeEnvironment;

    fn scheduler() -> RequestScheduler<NativeEnvironment> {
        RequestScheduler::new(
            NativeEnvironment,
            SchedulerSettings {
                high_delay: Duration::from_millis(10),
                medium_delay: Duration::from_millis(20),
                low_delay: Duration::from_millis(30),
                min_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(100),
                ..SchedulerSettings::default()
            },
        )
    }

    fn uri() -> Url {
        "file:///calc.twbl".parse().unwrap()
    }

    #[tokio::test]
    async fn critical_requests_run_immediately() {
        let s = scheduler();
        let key = RequestKey::global(RequestKind::Diagnostics, uri());
        let out = s.schedule(key, || async { 7 }).await;
        assert_eq!(out, Ok(7));
        assert_eq!(s.pending_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_keys_coalesce_to_the_latest() {
        let s = scheduler();
        let calls = Arc::new(AtomicUsize::new(0));

        let key = RequestKey::at(RequestKind::Hover, uri(), Position::new(1, 1));

        let first = s.schedule(key.clone(), {
            let calls = calls.clone();
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                "first"
            }
        });
        let second = s.schedule(key, {
            let calls = calls.clone();
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                "second"
            }
        });

        let (a, b) = futures::join!(first, second);
        assert_eq!(a, Err(ScheduleError::Cancelled));
        assert_eq!(b, Ok("second"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_positions_do_not_coalesce() {
        let s = scheduler();

        let first = s.schedule(
            RequestKey::at(RequestKind::Hover, uri(), Position::new(1, 1)),
            || async { 1 },
        );
        let second = s.schedule(
            RequestKey::at(RequestKind::Hover, uri(), Position::new(1, 2)),
            || async { 2 },
        );

        let (a, b) = futures::join!(first, second);
        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(2));
    }

    #[tokio::test]
    async fn clearing_a_document_cancels_its_requests() {
        let s = Arc::new(scheduler());
        let key = RequestKey::global(RequestKind::SemanticTokens, uri());

        let fut = s.schedule(key, || async { 1 });
        let clearer = async {
            tokio::time::sleep(Duration::from_millis(2)).await;
            s.clear_document_requests(&uri());
        };

        let (out, ()) = futures::join!(fut, clearer);
        assert_eq!(out, Err(ScheduleError::Cancelled));
    }

    #[tokio::test]
    async fn batching_dispatches_the_queue_early() {
        let s = Arc::new(RequestScheduler::new(
            NativeEnvironment,
            SchedulerSettings {
                low_delay: Duration::from_secs(60),
                batch_size: 3,
                ..SchedulerSettings::default()
            },
        ));

        let started = Instant::now();

        let mut futs = Vec::new();
        for n in 0..3 {
            let target: Url = format!("file:///calc{n}.twbl").parse().unwrap();
            futs.push(s.schedule(
                RequestKey::global(RequestKind::SemanticTokens, target),
                move || async move { n },
            ));
        }

        let results = futures::future::join_all(futs).await;
        assert!(results.iter().all(Result::is_ok));
        // Without the batch kick these would wait out a 60 s debounce.
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn flush_all_fires_everything() {
        let s = Arc::new(RequestScheduler::new(
            NativeEnvironment,
            SchedulerSettings {
                high_delay: Duration::from_secs(60),
                ..SchedulerSettings::default()
            },
        ));

        let key = RequestKey::at(RequestKind::Hover, uri(), Position::new(2, 2));
        let fut = s.schedule(key, || async { "flushed" });
        let flusher = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            s.flush_all().await;
        };

        let (out, ()) = futures::join!(fut, flusher);
        assert_eq!(out, Ok("flushed"));
        assert_eq!(s.pending_count(), 0);
    }

    #[tokio::test]
    async fn rapid_repeats_stretch_the_delay() {
        let s = scheduler();
        let key = RequestKey::at(RequestKind::Completion, uri(), Position::new(1, 1));
        let settings = *s.settings.lock();

        let d1 = {
            let mut shared = s.shared.lock();
            next_delay(&settings, &mut shared, &key)
        };
        let d2 = {
            let mut shared = s.shared.lock();
            next_delay(&settings, &mut shared, &key)
        };

        assert_eq!(d1, Duration::from_millis(20));
        assert!(d2 > d1);
    }
}
