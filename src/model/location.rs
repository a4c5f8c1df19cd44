use serde_repr::{Deserialize_repr, Serialize_repr};

/// Where a job's input originates, or where its output must land.
///
/// Serialized as a small integer on the wire to match the container's expected
/// contract (the containers themselves are not Rust and decode this as a plain int).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Location {
    Onchain = 0,
    Offchain = 1,
    Stream = 2,
}
