//! Network handling for client connections.
//!
//! ## Key Components
//! - [`TcpServer`] - server lifecycle with a background accept task
//! - [`TcpListener`] - bound socket, accept loop and per-session line handling
//! - [`SessionRegistry`] - bounded tracking of accepted sessions
//!
//! ## Examples
//!
//! ```rust,no_run
//! use quafka_broker::network::TcpServerBuilder;
//! use quafka_broker::routing::RequestRouter;
//! use quafka_broker::topic::TopicStore;
//! use quafka_core::Topic;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let router = RequestRouter::new(Arc::new(TopicStore::new()), Topic::new("default-topic")?);
//! let mut server = TcpServerBuilder::new().bind("127.0.0.1", 0).build(router)?;
//! let addr = server.start().await?;
//! println!("listening on {addr}");
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod listener;
pub mod server;
pub mod session;

pub use listener::TcpListener;
pub use server::{TcpServer, TcpServerBuilder};
pub use session::{Session, SessionRegistry, SessionState, SessionStats};
