/// The interfaces between the conditioner and its collaborators: the encoder
/// it drives, the transport it samples and the strategies it runs.
pub mod conditioner_control;

/// Per-connection transport counters.
pub mod transport;

/// Some unit types, such as [DataRate](units::DataRate) and [Timestamp](units::Timestamp).
pub mod units;
