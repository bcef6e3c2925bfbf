//! Eviction policy implementations (replacers).
//!
//! - [`LruKReplacer`] - evicts the frame with the largest backward
//!   k-distance; frames seen fewer than K times go first

mod lru_k;

pub use lru_k::LruKReplacer;
