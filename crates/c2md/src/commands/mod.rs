//! CLI command implementations.

mod clean;
mod convert;
mod status;

pub(crate) use clean::CleanArgs;
pub(crate) use convert::ConvertArgs;
pub(crate) use status::StatusArgs;
