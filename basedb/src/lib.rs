pub mod config;
pub mod document;
pub mod error;
pub mod mutation;
pub mod operation;
pub mod pipeline;
pub mod query;
pub mod store;

pub use config::Config;
pub use document::Document;
pub use error::{BaseDbError, Result};
pub use pipeline::{FindOptions, SortOrder};
pub use query::Query;
pub use store::{Collection, Store};
