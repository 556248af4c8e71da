//! Control-Plane API: a loopback, shared-secret authenticated HTTP surface
//! over the registry.

pub mod auth;
pub mod routes;
pub mod server;

pub use auth::{Secret, SECRET_HEADER};
pub use server::{ControlPlane, ControlServer};
