//! Communication plumbing and graph algorithms shared by the sweep layer.

pub mod communicator;
pub mod digraph;
pub mod exchange;
pub mod wire;

pub use communicator::{CommTag, Communicator, ExchangeTags, NoComm, RayonComm, Wait};
pub use digraph::DirectedGraph;
