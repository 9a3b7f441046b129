pub mod budget;
pub mod db;
pub mod digests;
pub mod feedback;
pub mod items;
pub mod models;
pub mod outbox;
pub mod schema;
pub mod sources;
pub mod usage;
pub mod users;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
