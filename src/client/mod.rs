// ABOUTME: Client role: sessions that log in to operator gateways, per-ISP pools and number-segment routing
// ABOUTME: Re-exports the session, factory and gateway types

//! Outbound side of the gateway.
//!
//! A [`Session`] is one logged-in connection. A [`SessionFactory`] keeps
//! up to `max_conns` sessions to one operator account and hands out the
//! least-used one. The [`Gateway`] routes phone numbers to factories by
//! number segment and tracks results under a query id.
//!
//! ```rust,no_run
//! use smsgate::auth::{ClientAuthRecord, Isp, MemoryAuthStore};
//! use smsgate::client::{FactoryConfig, Gateway, GatewayConfig};
//! use smsgate::datatypes::MtOptions;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let store: MemoryAuthStore = [ClientAuthRecord::new(Isp::Cmpp, "901234", "secret", 0x30)]
//!     .into_iter()
//!     .collect();
//! let gateway = Gateway::builder(GatewayConfig::default())
//!     .route(FactoryConfig::new(Isp::Cmpp, "901234", "127.0.0.1:7890", "^1"), &store)?
//!     .build();
//! gateway.start();
//!
//! let query_id = gateway.send(&["13800138000"], "hello", &MtOptions::default()).await?;
//! println!("{:?}", gateway.query(query_id));
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dialect;
pub mod factory;
pub mod gateway;
pub mod session;

pub use config::{ClientConfig, FactoryConfig, GatewayConfig};
pub use dialect::{ClientDialect, Inbound};
pub use factory::SessionFactory;
pub use gateway::{AnyFactory, Gateway, GatewayBuilder};
pub use session::{LRU_CEILING, Session};
