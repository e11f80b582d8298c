//! Storage access and the in-memory tree it is mirrored into.

pub mod handles;
pub mod local;
pub mod memory;
pub mod names;
pub mod operations;
pub mod storage;
pub mod sync;
pub mod tree;
pub mod validate;
