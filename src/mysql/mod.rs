// ABOUTME: MySQL/MariaDB backend for table sync
// ABOUTME: Implements the source/destination connection seams on top of mysql_async

pub mod connection;
pub mod destination;
pub mod source;
pub mod sql;

pub use connection::{connect, connect_with_retry, MySqlConnector};
pub use destination::MySqlDestination;
pub use source::MySqlSource;
