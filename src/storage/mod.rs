//! Storage layer: page store, WAL, checkpoint resolution, and B-tree walking

pub mod btree;
pub mod checkpoint;
pub mod header;
pub mod pager;
pub mod pcache;
pub mod wal;
