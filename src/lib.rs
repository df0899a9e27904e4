//! Dart Counter Server Library
//!
//! A WebSocket server tracking live dart games shared between devices,
//! built with tokio-tungstenite using the Actor pattern for state management.
//!
//! # Features
//! - Session creation with 6-character codes (no 0/O/1/I)
//! - Joining a session from any number of devices
//! - Straight "first to exactly zero" scoring with bust on overshoot or one
//! - Three darts per turn with automatic turn rotation
//! - Undo of the last throw, including busts and checkouts
//! - Optimistic version checks on every mutating command
//! - Live state broadcast to every device following the session
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Coordinator` creates sessions and routes commands by session code
//! - Each session has a `SessionWorker` that runs its commands one at a time
//!   and owns the session's broadcast topic
//! - `WorkerRegistry` maps codes to live workers; idle or deleted sessions
//!   retire their worker
//! - Each connection has a `handler` task talking to the Coordinator
//! - No locks around game state - all access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use dart_counter::{handle_connection, Config, Coordinator, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let coordinator = Coordinator::new(Arc::new(MemoryStore::new()), Config::default());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, coordinator.clone()));
//!     }
//! }
//! ```

pub mod codegen;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod handler;
pub mod history;
pub mod message;
pub mod player;
pub mod registry;
pub mod session;
pub mod store;
pub mod types;
pub mod worker;

// Re-export main types for convenience
pub use codegen::CodeGenerator;
pub use config::Config;
pub use coordinator::Coordinator;
pub use engine::ThrowOutcome;
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use history::{ThrowHistory, ThrowRecord};
pub use message::{ClientMessage, ErrorCode, ServerMessage, Snapshot};
pub use player::Player;
pub use registry::WorkerRegistry;
pub use session::{GameStatus, Session};
pub use store::{MemoryStore, SessionStore};
pub use types::{ClientId, Points, SessionCode};
pub use worker::{Joined, SessionCommand, SessionWorker};
