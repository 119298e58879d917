//! `SQLite` backend: connection pooling, migrations, row types, repositories.

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod row_types;
