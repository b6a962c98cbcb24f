//! The minimal in-memory buddy list the dispatcher keeps up to date. Persisting it is up to
//!  applications.

pub mod buddy_list;
