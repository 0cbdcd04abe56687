//! Wait strategies between task runs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::events::{Event, EventKind, EventResult, EventSystem, PendingEvent};

/// Value produced by a wait and handed to the next task run
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// A delay elapsed
    Elapsed(Duration),
    /// An event was published
    Event(Event),
}

impl WaitOutcome {
    pub fn event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            Self::Elapsed(_) => None,
        }
    }
}

#[derive(Clone)]
enum Strategy {
    FixedDelay(Duration),
    DynamicDelay(Arc<dyn Fn() -> Duration + Send + Sync>),
    Event {
        events: Arc<EventSystem>,
        kind: EventKind,
    },
}

/// Decides how long a [`Task`](super::Task) pauses between runs
#[derive(Clone)]
pub struct Waiter {
    strategy: Strategy,
    run_first: bool,
}

impl Waiter {
    /// Sleep for `delay` between runs. The first run happens immediately.
    pub fn fixed_delay(delay: Duration) -> Self {
        Self {
            strategy: Strategy::FixedDelay(delay),
            run_first: false,
        }
    }

    /// Sleep for whatever `delay` returns at the moment the wait starts
    pub fn dynamic_delay<F>(delay: F) -> Self
    where
        F: Fn() -> Duration + Send + Sync + 'static,
    {
        Self {
            strategy: Strategy::DynamicDelay(Arc::new(delay)),
            run_first: false,
        }
    }

    /// Block until the next event of `kind`. The first run also waits.
    pub fn for_event(events: Arc<EventSystem>, kind: EventKind) -> Self {
        Self {
            strategy: Strategy::Event { events, kind },
            run_first: true,
        }
    }

    /// Override whether the task waits once before its first run
    pub fn run_first(mut self, run_first: bool) -> Self {
        self.run_first = run_first;
        self
    }

    pub fn runs_first(&self) -> bool {
        self.run_first
    }

    /// Wait once
    pub async fn wait(&self) -> EventResult<WaitOutcome> {
        self.arm().wait().await
    }

    /// Register interest now; the returned wait can be awaited later without
    /// missing events published in between.
    pub(crate) fn arm(&self) -> ArmedWait {
        match &self.strategy {
            Strategy::FixedDelay(delay) => ArmedWait::Sleep(*delay),
            Strategy::DynamicDelay(delay) => ArmedWait::Sleep(delay()),
            Strategy::Event { events, kind } => ArmedWait::Event(events.subscribe_once(*kind)),
        }
    }
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match &self.strategy {
            Strategy::FixedDelay(delay) => format!("fixed_delay({delay:?})"),
            Strategy::DynamicDelay(_) => "dynamic_delay".to_string(),
            Strategy::Event { kind, .. } => format!("for_event({kind})"),
        };
        f.debug_struct("Waiter")
            .field("strategy", &strategy)
            .field("run_first", &self.run_first)
            .finish()
    }
}

pub(crate) enum ArmedWait {
    Sleep(Duration),
    Event(PendingEvent),
}

impl ArmedWait {
    pub(crate) async fn wait(self) -> EventResult<WaitOutcome> {
        match self {
            Self::Sleep(delay) => {
                tokio::time::sleep(delay).await;
                Ok(WaitOutcome::Elapsed(delay))
            }
            Self::Event(pending) => pending.wait(None).await.map(WaitOutcome::Event),
        }
    }
}
