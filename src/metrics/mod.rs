pub mod explain;
pub mod reliability;
pub mod signals;
pub mod stake;

pub use explain::Tier;
pub use reliability::ReliabilityBoard;
pub use signals::{count_positive_ev, DerivedSignals};
