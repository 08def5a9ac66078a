mod local;
pub mod telegram;

pub use local::{run_egress, run_ingest};

use tokio::sync::mpsc;

/// Byte cap for one message's text.
pub const MAX_MESSAGE_BYTES: usize = 1024;

/// Depth of the two global queues.
pub const QUEUE_DEPTH: usize = 8;

/// Bounded wait when a producer pushes onto a full input queue.
pub const ENQUEUE_TIMEOUT_MS: u64 = 100;

/// Where a message entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Chat,
    Schedule,
}

/// One inbound or outbound message. Text is capped at
/// [`MAX_MESSAGE_BYTES`], truncated on a char boundary at construction.
#[derive(Debug, Clone)]
pub struct Message {
    pub text: String,
    pub origin: Origin,
}

impl Message {
    pub fn new(origin: Origin, text: impl Into<String>) -> Self {
        let mut text = text.into();
        if text.len() > MAX_MESSAGE_BYTES {
            let mut cut = MAX_MESSAGE_BYTES;
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        Self { text, origin }
    }

    pub fn local(text: impl Into<String>) -> Self {
        Self::new(Origin::Local, text)
    }

    pub fn chat(text: impl Into<String>) -> Self {
        Self::new(Origin::Chat, text)
    }

    pub fn schedule(text: impl Into<String>) -> Self {
        Self::new(Origin::Schedule, text)
    }
}

/// The two global queues: everything inbound converges on the input queue,
/// every reply leaves through the output queue.
pub fn input_queue() -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
    mpsc::channel(QUEUE_DEPTH)
}

pub fn output_queue() -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
    mpsc::channel(QUEUE_DEPTH)
}
