//! Request/response model and the network collaborator.

mod client;
#[cfg(test)]
pub mod testing;
mod types;

pub use client::{Fetcher, HttpClient};
pub use types::{Request, RequestKey, Response};
