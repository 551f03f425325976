use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{ContextState, EvaluationSource};
use crate::health::{BackpressureLevel, Mode};
use crate::tasks::TaskKind;
use crate::watchdog::WatchdogAction;

/// Every observable engine transition produces an Event.
/// The host UI polls for events; diagnostics exports the recent log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ContextUpdated {
        state: ContextState,
        source: EvaluationSource,
        confidence: f64,
        sequence: u64,
        at: DateTime<Utc>,
    },
    /// An evaluation lost the commit race and was dropped.
    EvaluationDiscarded {
        sequence: u64,
        reason: String,
        at: DateTime<Utc>,
    },
    TaskRegistered {
        task: TaskKind,
        at: DateTime<Utc>,
    },
    TaskUnregistered {
        task: TaskKind,
        reason: String,
        at: DateTime<Utc>,
    },
    RegistrationFailed {
        task: TaskKind,
        error: String,
        at: DateTime<Utc>,
    },
    WatchdogInspection {
        action: WatchdogAction,
        at: DateTime<Utc>,
    },
    BackpressureChanged {
        from: BackpressureLevel,
        to: BackpressureLevel,
        at: DateTime<Utc>,
    },
    ModeChanged {
        from: Mode,
        to: Mode,
        at: DateTime<Utc>,
    },
    SleepOverrideChanged {
        enabled: bool,
        at: DateTime<Utc>,
    },
    EmergencyStopped {
        reason: String,
        at: DateTime<Utc>,
    },
}

/// Default capacity of the in-memory event log.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Bounded in-memory event log. Oldest events fall off the front.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<Event>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, event: Event) {
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
