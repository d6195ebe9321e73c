//! Ratio module - join and ranking

mod joiner;

pub use joiner::{rank_order, RankedTable, RatioJoiner, RatioRecord, DEFAULT_THRESHOLD};
