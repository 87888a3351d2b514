//! Event sink that records everything it receives

use imgto3d_common::{EventSink, ReconEvent};
use std::sync::Mutex;

type Hook = Box<dyn Fn(&ReconEvent) + Send + Sync>;

/// Records events in order; an optional hook runs synchronously per event
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ReconEvent>>,
    hook: Option<Hook>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(hook: impl Fn(&ReconEvent) + Send + Sync + 'static) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            hook: Some(Box::new(hook)),
        }
    }

    pub fn events(&self) -> Vec<ReconEvent> {
        self.events.lock().unwrap().clone()
    }

    /// `(message, percent)` of every progress event
    pub fn progress(&self) -> Vec<(String, i32)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReconEvent::Progress {
                    message, percent, ..
                } => Some((message, percent)),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.progress().into_iter().map(|(m, _)| m).collect()
    }

    /// Percent values of progress events that carry one
    pub fn percents(&self) -> Vec<i32> {
        self.progress()
            .into_iter()
            .map(|(_, p)| p)
            .filter(|p| *p >= 0)
            .collect()
    }

    pub fn terminal_events(&self) -> Vec<ReconEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.is_terminal())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ReconEvent) {
        self.events.lock().unwrap().push(event.clone());
        if let Some(hook) = &self.hook {
            hook(&event);
        }
    }
}
