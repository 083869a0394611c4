pub mod config;
pub mod errors;
pub mod job;
pub mod overrides;
pub mod trial;

pub use config::*;
pub use errors::*;
pub use job::*;
pub use overrides::*;
pub use trial::*;
