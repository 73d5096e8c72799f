pub mod environment;
pub mod net;
pub mod parser;
pub mod provider;
pub mod report;
pub mod runner;
pub mod timing;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_util;

// Re-export common items
pub use environment::Environment;
pub use provider::{Executable, Provider};
pub use report::generate_report;
pub use runner::{init, sequence, ClientSettings, ClientSettingsBuilder, Fetch, Test};
pub use timing::{async_get_entry, normalize_entry};
