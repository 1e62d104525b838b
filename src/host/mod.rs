//! Host-facing command channel: envelopes in, engine events out.

pub mod channel;
pub mod contract;
pub mod engines;
pub mod stdio;

pub use channel::{HostCommandClient, HostCommandServer, command_channel, command_channel_with_events};
pub use contract::{CommandEnvelope, CommandName, EventEnvelope, EventName, ResponseEnvelope};
pub use engines::{EngineHandler, EngineHandles, spawn_engines};
