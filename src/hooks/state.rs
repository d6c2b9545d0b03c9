//! States a [`crate::hooks::packet_context::PacketContext`] moves through
//! on its way from a received datagram to a crafted response.

use enum_iterator::Sequence;

#[derive(Copy, Debug, Sequence, PartialEq, Eq, Hash, Clone)]
pub enum PacketState {
    Received,
    Prepared,
    PostPrepared,
    Failure,
}
