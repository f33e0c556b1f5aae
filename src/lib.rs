mod error;
mod history;
mod settings;
mod stream_conditioner;
mod stream_stats;

pub use error::*;
pub use history::*;
pub use settings::*;
pub use stream_conditioner::*;
pub use stream_stats::*;
pub use strategy::*;

pub mod api;
pub mod strategy;
