//! Local replica of the user's dust (fee token) state.
//!
//! The state is rebuilt by replaying the network's dust event stream into a
//! Merkle accumulator plus the subset of dust UTXOs owned by the user. It
//! answers time-dependent balance queries and produces spend actions carrying
//! the zero-knowledge proof preimage for fee payment.
//!
//! A `DustLocalState` is exclusively owned by one logical caller for the
//! duration of one transaction; none of its operations are internally
//! synchronized. Replay of a long stream is synchronous and can take a
//! while on first run; call it from a task that will not starve the I/O
//! scheduler (e.g. `tokio::task::spawn_blocking`).

pub mod events;
mod state;

pub use events::{decode_events, encode_events, DustEvent, DustGenerationInfo, QualifiedDustOutput};
pub use state::{dust_public_key, DustLocalState, DustUtxoInfo};
