// ABOUTME: Protocol engine for the CMPP, SGIP and SMGP operator SMS gateway dialects
// ABOUTME: Wire codecs, client session pools with routing and result tracking, and a mock gateway server

//! # smsgate
//!
//! Talks the three Chinese operator SMS gateway protocols: CMPP (China
//! Mobile), SGIP (China Unicom) and SMGP (China Telecom).
//!
//! * [`cmpp`], [`sgip`] and [`smgp`] hold the PDUs and the `Frame` sum type
//!   of each dialect. [`protocol::Protocol`] plugs a dialect into the
//!   framing layer in [`connection`].
//! * [`client`] logs in to operator gateways, keeps per-account session
//!   pools and routes phone numbers by number segment.
//! * [`server`] accepts connections and answers like an operator gateway,
//!   with simulated delays, failures, status reports and MO traffic.
//! * [`tracking`] ties submits to their responses and status reports.
//!
//! ```rust,no_run
//! use smsgate::auth::{ClientAuthRecord, Isp, MemoryAuthStore};
//! use smsgate::client::{FactoryConfig, Gateway, GatewayConfig};
//! use smsgate::datatypes::MtOptions;
//!
//! #[tokio::main]
//! async fn main() -> smsgate::Result<()> {
//!     let store: MemoryAuthStore = [ClientAuthRecord::new(Isp::Smgp, "10010", "secret", smsgate::smgp::V30)]
//!         .into_iter()
//!         .collect();
//!
//!     let gateway = Gateway::builder(GatewayConfig::default())
//!         .route(FactoryConfig::new(Isp::Smgp, "10010", "127.0.0.1:9890", r"^1(33|53|8[019])"), &store)?
//!         .build();
//!     gateway.start();
//!
//!     let query_id = gateway.send(&["18912345678"], "hello", &MtOptions::default()).await?;
//!     println!("results: {:?}", gateway.query(query_id));
//!
//!     gateway.shutdown().await;
//!     Ok(())
//! }
//! ```

#[macro_use]
mod macros;

pub mod auth;
pub mod client;
pub mod cmpp;
pub mod codec;
pub mod connection;
pub mod datatypes;
pub mod error;
pub mod flow_control;
pub mod heartbeat;
pub mod protocol;
pub mod sequence;
pub mod server;
pub mod sgip;
pub mod smgp;
pub mod tracking;

#[cfg(test)]
mod tests;

pub use codec::{CodecError, Decodable, Encodable};
pub use error::{GatewayError, GatewayResult};
pub use protocol::Protocol;

/// Error returned by the demos and other top-level glue.
///
/// Library calls return [`GatewayError`] or [`CodecError`]; both convert
/// into this boxed form with `?`.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for application code built on the crate.
pub type Result<T> = std::result::Result<T, Error>;
