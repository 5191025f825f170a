//! Business logic behind the HTTP endpoints

pub mod ceremony;
pub mod internal;
pub mod nodes;
