pub mod fault;
pub mod invariants;
pub mod ops;
pub mod sim;

pub use fault::{FaultConfig, FaultStats, FaultyStore};
pub use invariants::Violation;
pub use ops::Op;
pub use sim::Sim;
