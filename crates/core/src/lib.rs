//! Domain layer shared by the storage crate and the HTTP application.
//!
//! Everything here is free of I/O: entity shapes, transfer objects and the
//! rules the services enforce before touching the database.
pub mod comment;
pub mod dto;
pub mod page;
pub mod place;
pub mod token;
pub mod types;
