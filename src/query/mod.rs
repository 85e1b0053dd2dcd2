//! Operator CLI surface: read commands over the store and the admin reimports.

pub mod commands;
pub mod formatters;
