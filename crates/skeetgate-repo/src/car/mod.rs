//! CAR (Content Addressable aRchive) file I/O
//!
//! Repository snapshots arrive as CAR files (for example the response body of
//! `com.atproto.sync.getRecord`), and finished proofs can be exported as CARs
//! holding exactly the blocks a verifier needs.
//!
//! # Examples
//!
//! Reading a CAR:
//! ```ignore
//! use skeetgate_repo::car::parse_car_bytes;
//!
//! let parsed = parse_car_bytes(&body).await?;
//! assert_eq!(parsed.roots.len(), 1);
//! ```
//!
//! Writing a CAR:
//! ```ignore
//! use skeetgate_repo::car::write_car_bytes;
//!
//! let bytes = write_car_bytes(commit_cid, blocks).await?;
//! ```

pub mod reader;
pub mod writer;

pub use reader::{ParsedCar, parse_car_bytes, read_car};
pub use writer::{write_car, write_car_bytes};
