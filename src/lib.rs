//! # slirc-ts6
//!
//! The mesh state engine behind the Straylight IRC daemon family: a
//! sans-I/O implementation of TS6 server linking. One [`Mesh`] holds the
//! network's channels, users, servers, and global bans; inbound TS6
//! frames are decoded into state mutations and outbound frames are
//! re-encoded per peer according to its capability flags.
//!
//! The engine assumes a single-threaded cooperative scheduler: handlers
//! take `&mut Mesh` and commit a whole frame's side effects before
//! returning, so no interior locking exists anywhere. The transport,
//! client command dispatch, numerics, and authentication live in the
//! embedding daemon; they talk to the engine through per-link send
//! queues, typed denial records, and the hook tables.
//!
//! ## Quick start
//!
//! ```rust
//! use slirc_ts6::{Config, Mesh};
//!
//! let config = Config::from_toml_str(
//!     "[server]\nname = \"hub.straylight.net\"\nsid = \"001\"\n",
//! )
//! .unwrap();
//! let mut mesh = Mesh::new(&config).unwrap();
//! mesh.link_peer(slirc_ts6::Sid(0), "peer.straylight.net", &["EUID", "BAN"]);
//!
//! // Feed frames from the transport:
//! mesh.handle_frame(
//!     slirc_ts6::Sid(0),
//!     ":000 EUID alice 1 1000 +i al cloak.net 10.0.0.1 000AAAAAB * * :Alice",
//!     1000,
//! );
//! assert!(mesh.pool.user_by_nick("alice").is_some());
//! ```

pub mod bans;
pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod line;
pub mod mesh;
pub mod state;
pub mod ts6;
pub mod util;

pub use bans::{Ban, BanStore, BanType};
pub use config::{Config, Limits};
pub use error::{HandlerResult, ProtoError};
pub use event::{Flow, HookSet, Hooks};
pub use id::{Sid, Uid, UidAllocator};
pub use line::Frame;
pub use mesh::Mesh;
pub use state::apply::{apply_cmodes, Applied, Denied, ModeBlockCtx, ModeHooks, ModeRequest};
pub use state::channel::{Channel, ListEntry, ModeValue, Topic};
pub use state::modes::{ModeChange, ModeKind, ModeTable};
pub use state::pool::Pool;
pub use state::server::{caps, Link, Server};
pub use state::user::User;
pub use state::Actor;
