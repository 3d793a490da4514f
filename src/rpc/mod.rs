//! Request protocol over HTTP.
//!
//! ```text
//!   actix-web (request-server thread) ──▶ server::routes ──▶ RequestHandler
//!        ▲                                     │
//!        └────────── JSON reply ◀──────────────┘
//! ```

pub mod server;
