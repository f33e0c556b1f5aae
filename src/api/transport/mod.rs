mod transport_stats;

pub use transport_stats::*;
