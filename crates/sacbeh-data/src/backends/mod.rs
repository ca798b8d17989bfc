//! Aggregation backends that push work down to the source

pub mod sql;

pub use sql::SqlBackend;
