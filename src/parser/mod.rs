pub mod types;
pub mod yaml;

pub use types::{HeaderSpec, ProviderSpec, SessionFile};
pub use yaml::{parse_session_file, parse_yaml_content};
