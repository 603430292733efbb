//! # tourney-transport
//!
//! Client-side plumbing for Tourney.
//!
//! - **Session** - Authenticated realtime session with reconnect and backoff
//! - **WebSocket** - Text-frame connector built on tokio-tungstenite
//! - **HTTP** - Snapshot store backed by the server's `/tournament` endpoints
//!
//! ## Transport Abstraction
//!
//! The session only sees the [`Connector`] and [`Connection`] traits, so it can
//! be driven by any transport that moves whole events.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tourney_core::EventDispatcher;
//! use tourney_transport::{ConnectionSession, SessionConfig, WebSocketConnector};
//!
//! let dispatcher = Arc::new(EventDispatcher::new());
//! let session = ConnectionSession::new(
//!     Arc::new(WebSocketConnector::default()),
//!     dispatcher,
//!     SessionConfig::default(),
//! );
//! session.connect("user-42");
//! ```

pub mod session;
pub mod traits;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use session::{Backoff, ConnectionSession, SessionConfig, SessionState};
pub use traits::{Connection, Connector, TransportError};

#[cfg(feature = "http")]
pub use http::HttpStore;

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;
