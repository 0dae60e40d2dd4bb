//! # Station Peer Library
//!
//! One peer per player. A peer mans one station of the shared vehicle,
//! keeps a read-only replica of the host's session and runs the same
//! action state machines as every other peer.
//!
//! ## Replication Model
//!
//! Nothing a peer does changes shared state directly. Console input is
//! validated locally and sent to the host as a request; the host relays
//! station actions back to *all* peers, the sender included, so every
//! `ActionPlayer` sees the same commands in the same order. Damage and
//! battery pickups detected on this peer are routed to the host, which
//! decides and replicates the result.
//!
//! Delivery is at-least-once without acknowledgement, so every handler in
//! [`game::PeerState::apply`] writes absolute values and tolerates repeats.
//!
//! ## Module Organization
//!
//! - `game`: session replica, command application and request routing
//! - `hazards`: locally simulated hazard entities
//! - `resolvers`: contact rules between hazards and vehicle zones
//! - `hud`: passive HUD model fed by replicated updates
//! - `input`: console line parsing
//! - `network`: UDP loop with frame, physics and heartbeat ticks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use peer::network::Peer;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut peer = Peer::new("127.0.0.1:8080", Duration::from_millis(16)).await?;
//!     peer.run().await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod hazards;
pub mod hud;
pub mod input;
pub mod network;
pub mod resolvers;
