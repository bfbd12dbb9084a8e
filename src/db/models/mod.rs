//! Database models split into separate files.
//! This module re-exports individual model modules so imports like
//! `use crate::db::models::*;` work.

pub mod location;
pub mod share;
pub mod user;

pub use self::location::*;
pub use self::share::*;
pub use self::user::*;
