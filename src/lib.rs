pub mod backend;
pub mod compile;
pub mod config;
pub mod date;
pub mod error;
pub mod highlight;
pub mod identity;
pub mod job;
pub mod lang;
pub mod logging;
pub mod query;
pub mod resolve;
pub mod result;
pub mod stream;

pub use error::SearchError;
pub use job::{CommitSearchJob, Services};
pub use pointer_history_protocol as protocol;
