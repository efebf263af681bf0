//! Concrete stacks.

pub mod rds_postgres;

pub use rds_postgres::RdsPostgresStack;
