pub mod config;
pub mod extract;
pub mod invoker;
pub mod pacing;
pub mod report;
pub mod scheduler;
pub mod stats;
pub mod template;
pub mod transport;

pub use config::*;
pub use extract::*;
pub use invoker::*;
pub use pacing::*;
pub use scheduler::*;
pub use stats::*;
pub use transport::*;
