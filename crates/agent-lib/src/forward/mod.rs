//! Envelope packaging and delivery to the message channel

mod channel;
mod envelope;
mod forwarder;

pub use channel::{ChannelMessage, InMemoryChannel, MessageChannel};
pub use envelope::{Envelope, EnvelopeBody, FILE_CHANGE_SEVERITY};
pub use forwarder::{
    EventForwarder, ForwardOutcome, ForwardStats, ForwarderConfig, ForwardingWorker,
    PipelineEvent,
};
