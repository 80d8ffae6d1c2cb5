//! # Request State HTTP
//!
//! Production [`HttpClient`](request_state_core::HttpClient) for request-state
//! controllers, backed by [`reqwest`].
//!
//! ## Example
//!
//! ```no_run
//! use request_state_core::{RequestConfig, deps};
//! use request_state_http::{ClientConfig, ReqwestClient};
//! use request_state_runtime::RequestController;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ReqwestClient::new(
//!         ClientConfig::default().with_base_url("https://jsonplaceholder.typicode.com/")?,
//!     )?;
//!     let controller = RequestController::create(client)?;
//!
//!     let mut observation = controller.observe(RequestConfig::get("users/1"), deps![1])?;
//!     observation.handle.wait().await;
//!
//!     println!("{:?}", controller.state());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - Base URL joining and query parameters
//! - Default and per-request headers
//! - Streaming body reads with a size limit
//! - Cancellation through the controller's token

pub mod client;
pub mod error;

pub use client::{ClientConfig, MAX_RESPONSE_SIZE, ReqwestClient};
pub use error::HttpError;
