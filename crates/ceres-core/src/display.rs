//! Display signals sent to the remote transcript.

use serde::{Deserialize, Serialize};

use crate::relay::RequestId;

/// Payload of an input affordance: where and under which id to answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAffordance {
    /// Correlation id the answer must carry.
    pub request_id: RequestId,
    /// Address of the relay endpoint accepting the answer.
    pub relay_url: Option<String>,
}

/// Receiver of display signals for one submission.
pub trait DisplaySink {
    /// Append text to the transcript.
    fn append(&mut self, text: &str);

    /// Clear transient display. With `wait`, the clear happens when the
    /// next output arrives.
    fn clear(&mut self, wait: bool);

    /// Show an input affordance.
    fn show_input(&mut self, affordance: &InputAffordance);

    /// Echo a solicited value into the transcript.
    ///
    /// Sinks whose front end already shows typed text (a terminal) override
    /// this to do nothing.
    fn echo_input(&mut self, text: &str) {
        self.append(text);
    }
}

/// A recorded display signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Append(String),
    Clear { wait: bool },
    ShowInput(InputAffordance),
    Echo(String),
}

/// Sink that records every signal.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: Vec<DisplayEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible transcript: appended and echoed text in order.
    pub fn transcript(&self) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                DisplayEvent::Append(text) | DisplayEvent::Echo(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Affordances shown, in order.
    pub fn affordances(&self) -> Vec<&InputAffordance> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DisplayEvent::ShowInput(affordance) => Some(affordance),
                _ => None,
            })
            .collect()
    }
}

impl DisplaySink for RecordingSink {
    fn append(&mut self, text: &str) {
        self.events.push(DisplayEvent::Append(text.to_string()));
    }

    fn clear(&mut self, wait: bool) {
        self.events.push(DisplayEvent::Clear { wait });
    }

    fn show_input(&mut self, affordance: &InputAffordance) {
        self.events.push(DisplayEvent::ShowInput(affordance.clone()));
    }

    fn echo_input(&mut self, text: &str) {
        self.events.push(DisplayEvent::Echo(text.to_string()));
    }
}

/// Wraps a sink and tracks whether the transcript ends at a line start.
pub(crate) struct Transcript<'a> {
    sink: &'a mut dyn DisplaySink,
    at_line_start: bool,
}

impl<'a> Transcript<'a> {
    pub(crate) fn new(sink: &'a mut dyn DisplaySink) -> Self {
        Self {
            sink,
            at_line_start: true,
        }
    }

    pub(crate) fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.at_line_start = text.ends_with('\n');
        self.sink.append(text);
    }

    pub(crate) fn clear(&mut self, wait: bool) {
        self.sink.clear(wait);
    }

    pub(crate) fn show_input(&mut self, affordance: &InputAffordance) {
        self.sink.show_input(affordance);
    }

    /// Echo a solicited value on its own line.
    pub(crate) fn echo_input(&mut self, value: &str) {
        let mut echoed = String::with_capacity(value.len() + 2);
        if !self.at_line_start {
            echoed.push('\n');
        }
        echoed.push_str(value);
        echoed.push('\n');

        self.at_line_start = true;
        self.sink.echo_input(&echoed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_starts_new_line_after_prompt() {
        let mut sink = RecordingSink::new();
        {
            let mut transcript = Transcript::new(&mut sink);
            transcript.append("Enter: ");
            transcript.echo_input("5");
            transcript.append("done\n");
        }
        assert_eq!(sink.transcript(), "Enter: \n5\ndone\n");
    }

    #[test]
    fn test_echo_without_prefix_at_line_start() {
        let mut sink = RecordingSink::new();
        {
            let mut transcript = Transcript::new(&mut sink);
            transcript.echo_input("first");
            transcript.append("line\n");
            transcript.echo_input("second");
        }
        assert_eq!(sink.transcript(), "first\nline\nsecond\n");
    }

    #[test]
    fn test_line_state_follows_last_append() {
        let mut sink = RecordingSink::new();
        {
            let mut transcript = Transcript::new(&mut sink);
            transcript.append("a\n");
            transcript.append("b? ");
            transcript.append("");
            transcript.echo_input("1");
            transcript.append("c\nd? ");
            transcript.echo_input("2");
            transcript.echo_input("3");
        }
        assert_eq!(sink.transcript(), "a\nb? \n1\nc\nd? \n2\n3\n");
    }

    #[test]
    fn test_affordance_serializes_request_id_as_string() {
        let affordance = InputAffordance {
            request_id: RequestId::new(),
            relay_url: Some("http://127.0.0.1:4000/".to_string()),
        };
        let json = serde_json::to_value(&affordance).unwrap();
        assert_eq!(json["request_id"], affordance.request_id.to_string());
    }
}
