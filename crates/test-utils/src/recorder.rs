use std::sync::{Arc, Mutex};
use std::time::Duration;

use probevisor::ExecutionHandler;
use probevisor::exec::ProcessResult;

/// What a [`RecordingHandler`] observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(Option<u32>),
    Line(String),
    Completed(ProcessResult),
}

/// An `ExecutionHandler` that records every callback.
///
/// Clone the [`Recording`] before handing the handler to the supervisor to
/// inspect events from the test.
pub struct RecordingHandler {
    recording: Recording,
}

#[derive(Clone, Default)]
pub struct Recording {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingHandler {
    pub fn new() -> (Self, Recording) {
        let recording = Recording::default();
        (
            Self {
                recording: recording.clone(),
            },
            recording,
        )
    }
}

impl ExecutionHandler for RecordingHandler {
    fn on_start(&mut self, pid: Option<u32>) {
        self.recording.push(Event::Started(pid));
    }

    fn on_line(&mut self, line: &str) {
        self.recording.push(Event::Line(line.to_string()));
    }

    fn on_complete(&mut self, result: &ProcessResult) {
        self.recording.push(Event::Completed(result.clone()));
    }
}

impl Recording {
    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Line(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<ProcessResult> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Completed(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Poll until a line equal to `expected` has been relayed.
    pub async fn wait_for_line(&self, expected: &str) {
        for _ in 0..500 {
            if self.lines().iter().any(|l| l == expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("line {expected:?} was never relayed; got {:?}", self.lines());
    }
}
