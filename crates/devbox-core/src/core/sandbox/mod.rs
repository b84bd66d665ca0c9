//! Container CLI backed sandbox access.

mod docker;
mod errors;
mod inspect;

pub use docker::ContainerCli;
pub(crate) use errors::sandbox_error;
