//! Row structs decoded from PostgreSQL.

pub mod job;
