use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tasq_models::TaskEvent;
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::error::EngineError;

const CHANNEL_CAPACITY: usize = 64;

struct LogInner {
    history: Vec<TaskEvent>,
    tx: broadcast::Sender<(usize, TaskEvent)>,
    closed: bool,
}

/// Append-only event log for one task, with broadcast fan-out.
///
/// Every subscriber replays the full history before receiving live events.
/// Events carry their log position on the channel so a lagged receiver can
/// resync from the log without delivering anything twice.
pub struct TaskEventLog {
    inner: Mutex<LogInner>,
}

impl TaskEventLog {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(LogInner {
                history: Vec::new(),
                tx,
                closed: false,
            }),
        }
    }

    /// Append an event and wake live subscribers.
    ///
    /// The log closes at the first terminal event; anything published after
    /// that is dropped.
    pub fn publish(&self, event: TaskEvent) {
        let Ok(mut inner) = self.inner.lock() else {
            error!("Event log lock poisoned; dropping event");
            return;
        };
        if inner.closed {
            debug!("Dropping event published after terminal state");
            return;
        }
        if event.is_terminal() {
            inner.closed = true;
        }
        let seq = inner.history.len();
        inner.history.push(event.clone());
        let _ = inner.tx.send((seq, event));
    }

    /// Open an independent stream over this log: full history first, then
    /// live events, ending after the terminal event.
    pub fn subscribe(self: Arc<Self>) -> Result<EventStream, EngineError> {
        let (buffered, rx) = {
            let inner = self
                .inner
                .lock()
                .map_err(|e| EngineError::Internal(format!("event log lock poisoned: {e}")))?;
            let buffered: VecDeque<TaskEvent> = inner.history.iter().cloned().collect();
            (buffered, inner.tx.subscribe())
        };
        Ok(EventStream {
            buffered,
            rx,
            log: self,
            delivered: 0,
            done: false,
        })
    }

    fn history_from(&self, start: usize) -> VecDeque<TaskEvent> {
        match self.inner.lock() {
            Ok(inner) => inner.history[start.min(inner.history.len())..]
                .iter()
                .cloned()
                .collect(),
            Err(e) => {
                error!(error = %e, "Event log lock poisoned during resync");
                VecDeque::new()
            }
        }
    }
}

impl Default for TaskEventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's cursor over a task's events.
pub struct EventStream {
    buffered: VecDeque<TaskEvent>,
    rx: broadcast::Receiver<(usize, TaskEvent)>,
    log: Arc<TaskEventLog>,
    /// Number of events already handed to the caller.
    delivered: usize,
    done: bool,
}

impl EventStream {
    /// Next event in publish order, or `None` once the terminal event has
    /// been delivered (or every publisher is gone).
    pub async fn next(&mut self) -> Option<TaskEvent> {
        loop {
            if self.done {
                return None;
            }
            if let Some(event) = self.buffered.pop_front() {
                self.delivered += 1;
                if event.is_terminal() {
                    self.done = true;
                }
                return Some(event);
            }
            match self.rx.recv().await {
                Ok((seq, event)) => {
                    if seq < self.delivered {
                        // Already replayed from history.
                        continue;
                    }
                    if seq > self.delivered {
                        self.buffered = self.log.history_from(self.delivered);
                        continue;
                    }
                    self.delivered += 1;
                    if event.is_terminal() {
                        self.done = true;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    self.buffered = self.log.history_from(self.delivered);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}
