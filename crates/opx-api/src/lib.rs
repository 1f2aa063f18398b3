//! # API Services
//!
//! The query surface exposed to RPC and WebSocket frontends. The
//! frontends themselves (HTTP server, socket transport) live outside the
//! core; this crate owns parameter validation, encodings, the service
//! handlers, the WebSocket frame codec, and per-client session policy.
//!
//! ## Encodings
//!
//! Hashes and big integers are `0x`-prefixed hex; storage pointers,
//! values, and event data are base64.

pub mod balances;
pub mod blocks;
pub mod epochs;
pub mod error;
pub mod limits;
pub mod state;
pub mod transactions;
pub mod ws;

pub use balances::BalanceQueryService;
pub use blocks::BlockQueryService;
pub use epochs::EpochQueryService;
pub use error::ApiError;
pub use limits::ApiLimits;
pub use state::StateQueryService;
pub use transactions::TransactionQueryService;
pub use ws::{Frame, Handshake, SessionLimits, SessionPolicy, WsCloseCode};
