extern crate bincode;
#[macro_use]
extern crate log;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate thiserror;
extern crate time;

pub mod error;
pub mod hash;
pub mod queue;
pub mod prefix;
pub mod dht;
pub mod overlay;
pub mod rdt;

pub use self::error::{Error, Result};

/// The largest hash value; the ring covers the closed interval [0, MAX_HASH].
pub const MAX_HASH: u32 = 0x7fff_ffff;

/// The capacity of every inter-thread packet queue.
const QUEUE_SIZE: usize = 1000;

/// The maximum length of a wire message in bytes.
const MESSAGE_LENGTH: usize = 8196;

/// Request timeout time in milliseconds.
const REQUEST_TIMEOUT: u64 = 5000;

/// The maximum number of cached (key,value) pairs held by a relay.
const CACHE_SIZE: usize = 1024;

/// Initial TTL carried by packets entering the ring or the overlay.
const INIT_TTL: i32 = 100;
