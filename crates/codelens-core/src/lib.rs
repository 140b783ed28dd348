pub mod config_manager;
pub mod error;
pub mod logging;
pub mod naming;
pub mod query;
pub mod records;
pub mod types;
pub mod vocabulary;

pub use config_manager::*;
pub use error::*;
pub use logging::init_logging;
pub use query::*;
pub use records::*;
pub use types::*;
pub use vocabulary::*;
