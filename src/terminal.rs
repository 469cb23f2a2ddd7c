use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::submission::Status;

/// Per-submission stdin buffer depth. Senders never block; overflow is
/// dropped with a log note.
const INPUT_CHANNEL_CAPACITY: usize = 10;

/// A frame sent to terminal subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum TerminalMessage {
    Output {
        text: String,
        #[serde(rename = "isError")]
        is_error: bool,
    },
    Status {
        status: Status,
    },
    System(String),
    Error {
        #[serde(rename = "errorType")]
        error_type: String,
        message: String,
    },
    InputPrompt(String),
}

impl TerminalMessage {
    pub fn output(text: impl Into<String>, is_error: bool) -> Self {
        TerminalMessage::Output {
            text: text.into(),
            is_error,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        TerminalMessage::System(text.into())
    }

    pub fn error(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        TerminalMessage::Error {
            error_type: error_type.into(),
            message: message.into(),
        }
    }
}

struct Subscriber {
    id: u64,
    sink: mpsc::UnboundedSender<TerminalMessage>,
}

/// Fan-out point between one running submission and its live terminals.
///
/// Subscribers are held by id, not owned by the supervisor: presence implies
/// liveness, and a failed write detaches only that subscriber. Broadcasts
/// snapshot the list and write outside the lock so a slow terminal cannot
/// stall the others.
#[derive(Default)]
pub struct TerminalHub {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    inputs: Mutex<HashMap<String, mpsc::Sender<String>>>,
    next_subscriber_id: AtomicU64,
}

impl TerminalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subscriber to a submission. The returned receiver yields
    /// every frame broadcast after this call; it closes when the run ends.
    pub fn subscribe(
        &self,
        submission_id: &str,
    ) -> (u64, mpsc::UnboundedReceiver<TerminalMessage>) {
        let (sink, source) = mpsc::unbounded_channel();
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers
            .entry(submission_id.to_string())
            .or_default()
            .push(Subscriber { id, sink });
        log::debug!(
            "terminal subscriber {id} attached to submission {submission_id} (total: {})",
            subscribers[submission_id].len()
        );
        (id, source)
    }

    pub fn unsubscribe(&self, submission_id: &str, subscriber_id: u64) {
        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(list) = subscribers.get_mut(submission_id) {
            list.retain(|s| s.id != subscriber_id);
            if list.is_empty() {
                subscribers.remove(submission_id);
            }
        }
        log::debug!("terminal subscriber {subscriber_id} detached from {submission_id}");
    }

    /// Send a frame to every live subscriber of a submission. Subscribers
    /// whose receiving side is gone are detached; nothing else is affected.
    pub fn broadcast(&self, submission_id: &str, message: TerminalMessage) {
        let snapshot: Vec<(u64, mpsc::UnboundedSender<TerminalMessage>)> = {
            let subscribers = self.subscribers.lock().unwrap();
            match subscribers.get(submission_id) {
                Some(list) => list.iter().map(|s| (s.id, s.sink.clone())).collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (id, sink) in snapshot {
            if sink.send(message.clone()).is_err() {
                dead.push(id);
            }
        }
        for id in dead {
            self.unsubscribe(submission_id, id);
        }
    }

    /// Register the interactive stdin channel for a run; the supervisor holds
    /// the receiving end for the lifetime of the process.
    pub fn register_input(&self, submission_id: &str) -> mpsc::Receiver<String> {
        let (sender, receiver) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        self.inputs
            .lock()
            .unwrap()
            .insert(submission_id.to_string(), sender);
        receiver
    }

    /// Forward a chunk of subscriber input toward the process stdin. Never
    /// blocks: with the buffer full or the run gone, the chunk is dropped.
    pub fn send_input(&self, submission_id: &str, chunk: String) {
        let sender = self.inputs.lock().unwrap().get(submission_id).cloned();
        match sender {
            Some(sender) => {
                if let Err(e) = sender.try_send(chunk) {
                    log::warn!("input for submission {submission_id} dropped: {e}");
                }
            }
            None => log::debug!("input for submission {submission_id} ignored, no running process"),
        }
    }

    pub fn has_input_channel(&self, submission_id: &str) -> bool {
        self.inputs.lock().unwrap().contains_key(submission_id)
    }

    /// Tear down everything attached to a finished run. Dropping the sinks
    /// closes every subscriber's receiver.
    pub fn finish(&self, submission_id: &str) {
        self.inputs.lock().unwrap().remove(submission_id);
        self.subscribers.lock().unwrap().remove(submission_id);
    }
}

/// Advisory check whether an output line looks like an input prompt. Used
/// only for UI cues; never alters submission state.
pub fn is_input_prompt(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() || text.len() > 100 {
        return false;
    }

    if text.ends_with(':') || text.ends_with('>') || text.ends_with('?') || text.ends_with("...") {
        return true;
    }

    let lower = text.to_lowercase();
    ["input", "enter", "type", "provide"]
        .iter()
        .any(|word| lower.contains(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_detection_by_suffix() {
        assert!(is_input_prompt("Your name:"));
        assert!(is_input_prompt(">"));
        assert!(is_input_prompt("How many?"));
        assert!(is_input_prompt("Loading..."));
        assert!(!is_input_prompt("Hello, World!"));
    }

    #[test]
    fn test_prompt_detection_by_keyword() {
        assert!(is_input_prompt("Please enter a number"));
        assert!(is_input_prompt("TYPE SOMETHING"));
        assert!(!is_input_prompt(""));
        assert!(!is_input_prompt(&"x".repeat(101)));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let hub = TerminalHub::new();
        let (_, mut rx1) = hub.subscribe("sub");
        let (_, mut rx2) = hub.subscribe("sub");

        hub.broadcast("sub", TerminalMessage::output("hi", false));
        assert!(matches!(
            rx1.recv().await,
            Some(TerminalMessage::Output { text, .. }) if text == "hi"
        ));
        assert!(matches!(
            rx2.recv().await,
            Some(TerminalMessage::Output { text, .. }) if text == "hi"
        ));
    }

    #[tokio::test]
    async fn test_dead_subscriber_is_detached() {
        let hub = TerminalHub::new();
        let (_, rx_dead) = hub.subscribe("sub");
        let (_, mut rx_live) = hub.subscribe("sub");
        drop(rx_dead);

        hub.broadcast("sub", TerminalMessage::system("still here"));
        assert!(matches!(
            rx_live.recv().await,
            Some(TerminalMessage::System(text)) if text == "still here"
        ));
        assert_eq!(hub.subscribers.lock().unwrap()["sub"].len(), 1);
    }

    #[tokio::test]
    async fn test_finish_closes_subscribers() {
        let hub = TerminalHub::new();
        let (_, mut rx) = hub.subscribe("sub");
        hub.broadcast("sub", TerminalMessage::system("bye"));
        hub.finish("sub");

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
        assert!(!hub.has_input_channel("sub"));
    }

    #[tokio::test]
    async fn test_input_overflow_is_dropped() {
        let hub = TerminalHub::new();
        let mut rx = hub.register_input("sub");

        for i in 0..INPUT_CHANNEL_CAPACITY + 5 {
            hub.send_input("sub", format!("line {i}"));
        }

        let mut received = 0;
        while let Ok(chunk) = rx.try_recv() {
            assert!(chunk.starts_with("line"));
            received += 1;
        }
        assert_eq!(received, INPUT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_message_wire_shape() {
        let json = serde_json::to_value(TerminalMessage::output("oops", true)).unwrap();
        assert_eq!(json["type"], "output");
        assert_eq!(json["content"]["text"], "oops");
        assert_eq!(json["content"]["isError"], true);

        let json = serde_json::to_value(TerminalMessage::system("hello")).unwrap();
        assert_eq!(json["type"], "system");
        assert_eq!(json["content"], "hello");
    }
}
