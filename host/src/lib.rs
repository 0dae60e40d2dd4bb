//! # Session Host Library
//!
//! This library provides the authoritative host for a cooperative crew
//! session. One process owns the session values, decides every spawn,
//! every point of damage and every round transition, and fans those
//! decisions out to the peers as replicated commands.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Session State
//! Health, battery charge, spawn cadence and the round index live only
//! here. Peers hold read-only replicas that change solely through the
//! commands the host sends.
//!
//! ### Spawn Scheduling
//! Hazards are handed to one peer at a time. Neither the target peer nor
//! the hazard kind is ever picked twice in a row, and the kinds on offer
//! follow the stations manned this round.
//!
//! ### Round Rotation
//! After a randomised round length and a fixed countdown every peer moves
//! one station along. Surviving the last rotation wins the session.
//!
//! ### Relay
//! Station actions requested by a peer are relayed to every peer, the
//! requester included, so all of them apply the same command stream.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The host-owned `Session` values, the `Phase` state machine and the
//! `Outbound` command envelope.
//!
//! ### Orchestrator Module (`orchestrator`)
//! Sans-IO session logic: ticks, spawning, battery drain, damage, rotation,
//! victory and game over. It queues outbound commands and never touches a
//! socket, which keeps it deterministic under a seeded RNG.
//!
//! ### Roster Module (`roster`)
//! Connected peers, their stable slots and timeout tracking.
//!
//! ### Replication Module (`replication`)
//! The buffered command log replayed to late joiners.
//!
//! ### Network Module (`network`)
//! UDP sockets, request validation, scoped delivery and the tick loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use host::network::Host;
//! use shared::SessionConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Host for five peers ticking at 60Hz
//!     let mut host = Host::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16),
//!         SessionConfig::default(),
//!         5,
//!     ).await?;
//!
//!     host.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The host runs internal async tasks for receiving datagrams, sending
//! queued packets and expiring silent peers, while the main loop owns the
//! orchestrator and processes everything sequentially.

pub mod network;
pub mod orchestrator;
pub mod replication;
pub mod roster;
pub mod session;
