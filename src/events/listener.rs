//! Event listeners

use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{Event, EventKind};

/// Future returned by a listener callback
pub type ListenerFuture = BoxFuture<'static, anyhow::Result<()>>;

type Callback = Arc<dyn Fn(Event) -> ListenerFuture + Send + Sync>;

/// A callback subscribed to one event kind.
///
/// Two listeners are equal when they share the event kind and the same
/// callback allocation, so a clone of a registered listener can be used to
/// remove it again.
#[derive(Clone)]
pub struct Listener {
    name: Arc<str>,
    kind: EventKind,
    callback: Callback,
    lock: Option<Arc<Mutex<()>>>,
}

impl Listener {
    /// Create a listener running `callback` for every event of `kind`
    pub fn new<F, Fut>(name: impl Into<String>, kind: EventKind, callback: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            kind,
            callback: Arc::new(move |event| -> ListenerFuture { Box::pin(callback(event)) }),
            lock: None,
        }
    }

    /// Serialize successive invocations of this listener
    pub fn with_lock(mut self) -> Self {
        self.lock = Some(Arc::new(Mutex::new(())));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Run the callback for `event` in a new task.
    ///
    /// Callback errors are logged and swallowed.
    pub fn trigger(&self, event: Event) -> JoinHandle<()> {
        let listener = self.clone();
        tokio::spawn(async move {
            let _guard = match &listener.lock {
                Some(lock) => Some(lock.clone().lock_owned().await),
                None => None,
            };

            if let Err(e) = (listener.callback)(event).await {
                tracing::warn!(
                    listener = %listener.name,
                    kind = %listener.kind,
                    error = %e,
                    "Listener failed, ignoring"
                );
            }
        })
    }

    fn callback_addr(&self) -> *const () {
        Arc::as_ptr(&self.callback) as *const ()
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.callback_addr() == other.callback_addr()
    }
}

impl Eq for Listener {}

impl Hash for Listener {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.callback_addr().hash(state);
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("with_lock", &self.lock.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn refresh_event() -> Event {
        Event::contest_list_refresh(Vec::new())
    }

    #[test]
    fn test_equality_by_kind_and_callback() {
        let a = Listener::new("a", EventKind::ContestListRefresh, |_| async { Ok(()) });
        let a_clone = a.clone();
        let b = Listener::new("a", EventKind::ContestListRefresh, |_| async { Ok(()) });

        assert_eq!(a, a_clone);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_trigger_runs_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = Listener::new("count", EventKind::ContestListRefresh, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        listener.trigger(refresh_event()).await.unwrap();
        listener.trigger(refresh_event()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_trigger_swallows_errors() {
        let listener = Listener::new("fails", EventKind::ContestListRefresh, |_| async {
            Err::<(), _>(anyhow::anyhow!("boom"))
        });

        let result = listener.trigger(refresh_event()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_with_lock_serializes_invocations() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = log.clone();
        let listener = Listener::new("slow", EventKind::ContestListRefresh, move |_| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push("start");
                tokio::time::sleep(Duration::from_millis(20)).await;
                sink.lock().unwrap().push("end");
                Ok(())
            }
        })
        .with_lock();

        let first = listener.trigger(refresh_event());
        let second = listener.trigger(refresh_event());
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["start", "end", "start", "end"]);
    }

    #[tokio::test]
    async fn test_without_lock_invocations_overlap() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = log.clone();
        let listener = Listener::new("slow", EventKind::ContestListRefresh, move |_| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push("start");
                tokio::time::sleep(Duration::from_millis(20)).await;
                sink.lock().unwrap().push("end");
                Ok(())
            }
        });

        let first = listener.trigger(refresh_event());
        let second = listener.trigger(refresh_event());
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["start", "start", "end", "end"]);
    }
}
