//! Types shared between the Refuge server crates and the client core:
//! persisted entities, REST bodies, JWT claims and gateway frames.

pub mod api;
pub mod events;
pub mod models;
