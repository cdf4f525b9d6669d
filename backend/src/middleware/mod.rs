//! Request extractors

pub mod actor;

pub use actor::{CurrentUser, USER_ID_HEADER};
