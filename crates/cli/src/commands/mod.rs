//! CLI commands for the straddle/strangle engine.

pub mod open;
pub mod preview;
pub mod strategy;
pub mod strikes;

pub use open::OpenArgs;
pub use preview::PreviewArgs;
pub use strikes::StrikesArgs;
