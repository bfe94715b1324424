//! # Audio Module
//!
//! Per-guild playback on top of a shared, bounded audio cache.
//!
//! ## Architecture
//!
//! ### [`registry`] - Session Registry
//! - One [`session::PlaybackSession`] per guild, created on the first request
//! - Sessions remove themselves after the idle timeout or an explicit stop
//!
//! ### [`session`] - Playback Loop
//! - FIFO queue of [`queue::Request`]s driven by a single task per guild
//! - Pause, resume, skip, clear and shuffle act on the live session
//!
//! ### [`coordinator`] - Resolution
//! - Turns a query into a pinned file in the [`crate::cache::AudioCache`]
//! - Concurrent requests for the same query or track share one lookup and
//!   one download ([`flight`])
//!
//! ### [`transport`] / [`voice`] - Voice Output
//! - [`transport::Transport`] abstracts connecting and playing a file
//! - [`voice::SongbirdTransport`] is the Discord implementation
//!
//! Session lifecycle changes are published on the [`events::EventBus`].

pub mod coordinator;
pub mod events;
pub mod flight;
pub mod queue;
pub mod registry;
pub mod session;
pub mod transport;
pub mod voice;

pub use coordinator::{ResolutionCoordinator, ResolvedTrack};
pub use queue::Request;
pub use registry::SessionRegistry;
pub use session::{PlayerState, SessionSettings};
