pub mod client;
pub mod messages;

pub use client::{NatsClient, NatsSink, SUBJECT_PREFIX};
pub use messages::EventMessage;
