//! Defines an abstract representation of the data that flows through a
//! [`crate::hooks::hook_registry::HookRegistry`].
//!
//! A [`PacketContext`] wraps an input packet, used to derive it, and an
//! output packet, initially empty, enriched by successive [`Hook`] runs.
//!
//! [`Hook`]: crate::hooks::hook_registry::Hook

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::state::PacketState;

/// Anything that can be read from and written to the wire.
pub trait PacketType {
    fn to_raw_bytes(&self) -> Vec<u8>;
    fn empty() -> Self;
    fn from_raw_bytes(raw: &[u8]) -> Self;
}

/// Ties together an input packet, its in-progress output packet, and the
/// bookkeeping (id, timestamp, state) the hook pipeline needs.
pub struct PacketContext<T: PacketType, U: PacketType> {
    time: DateTime<Utc>,
    id: Uuid,
    state: PacketState,
    input_packet: T,
    output_packet: U,
}

impl<T: PacketType, U: PacketType> PacketContext<T, U> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> PacketState {
        self.state
    }

    pub fn set_state(&mut self, new_state: PacketState) {
        self.state = new_state;
    }

    pub fn get_output(&self) -> &U {
        &self.output_packet
    }

    pub fn get_input(&self) -> &T {
        &self.input_packet
    }

    pub fn get_mut_output(&mut self) -> &mut U {
        &mut self.output_packet
    }

    pub fn get_mut_input(&mut self) -> &mut T {
        &mut self.input_packet
    }

    pub fn input_to_raw(&self) -> Vec<u8> {
        self.input_packet.to_raw_bytes()
    }

    pub fn output_to_raw(&self) -> Vec<u8> {
        self.output_packet.to_raw_bytes()
    }

    /// Wall-clock age of this context since it was created from its input.
    pub fn lifetime(&self) -> Duration {
        Utc::now() - self.time
    }

    /// Consumes the context, returning the output packet it accumulated.
    pub fn drop(self) -> U {
        self.output_packet
    }
}

impl<T: PacketType, U: PacketType> From<T> for PacketContext<T, U> {
    fn from(value: T) -> Self {
        Self {
            time: Utc::now(),
            id: Uuid::new_v4(),
            state: PacketState::Received,
            input_packet: value,
            output_packet: U::empty(),
        }
    }
}
