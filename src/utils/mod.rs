//! Small helpers shared by the HTTP layer.

pub mod validate;
