pub mod error;
pub mod traits;
pub mod types;

mod client;

pub use client::HttpL1Client;
pub use error::{ClientError, ClientResult};
