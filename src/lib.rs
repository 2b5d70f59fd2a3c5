//! sqlite-tui: multi-tenant database studio core for SQLite
//!
//! A single daemon exposes a catalog of SQLite files to remote users over
//! SSH, serving an interactive terminal UI and a scriptable command surface
//! through the same transport. This crate is the server-side core: it
//! discovers and tracks database files on disk, resolves each user's
//! effective access level, multiplexes reads and writes across concurrent
//! sessions under an advisory locking discipline, executes queries and
//! structural operations with correct authorization, and persists session,
//! query, and audit records in a private metadata store.
//!
//! The SSH transport, TUI rendering, and argument parsing for the outer
//! binary are external collaborators: the core receives already-identified
//! sessions and opaque byte streams, and exposes the command surface they
//! drive.
//!
//! # Architecture
//! - [`access`]: ordered access levels and the rule-based resolver
//! - [`config`]: the validated configuration and its file watcher
//! - [`engine`]: discovery, connections, advisory locks, introspection,
//!   query execution, and the authorization-aware manager
//! - [`session`]: the live session registry
//! - [`history`]: the persistent session/query/audit store
//! - [`cli`]: the transport-agnostic command surface
//! - [`output`]: JSON/CSV/table rendering

pub mod access;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod output;
pub mod session;

pub use access::{Level, Resolver, User};
pub use cli::{CommandContext, Handler};
pub use config::{Config, DatabaseSource};
pub use engine::{Connection, Discovery, LockManager, Manager, QueryResult};
pub use error::{Result, StudioError};
pub use history::Store;
pub use session::SessionRegistry;
