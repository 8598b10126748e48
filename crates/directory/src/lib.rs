//! Persistence for the mutual-post bot: the channel registry, the
//! post-request audit log, and the admin block list.
//!
//! Each concern is a small async trait so the exchange engine and the
//! Telegram handlers can be tested against in-memory doubles; the production
//! implementation is a single SQLite store.

pub mod blocklist;
pub mod directory;
pub mod requests;
pub mod store_sqlite;
pub mod types;

pub use {
    blocklist::BlockList,
    directory::ChannelDirectory,
    requests::RequestLog,
    store_sqlite::SqliteStore,
    types::{BlockedUser, ChannelStanding, PostRequest, RegisteredChannel, RequestStatus},
};
