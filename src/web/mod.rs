//! The HTTP control surface.

pub mod routes;
mod server;

pub use server::{router, serve};
