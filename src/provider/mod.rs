//! Provider capability trait and the providers shipped with the crate.

pub mod configured;
mod errors;
mod traits;

pub use configured::ConfiguredProvider;
pub use errors::KnownError;
pub use traits::{Executable, Provider, SessionConfig, SessionConfigSlot};
