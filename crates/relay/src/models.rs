//! These models represent the values that cross the agent core boundary
//!
//! Native engine notifications never leave the core. They are converted into
//! `Event`s, which are plain data that any transport can serialize, and the
//! per-agent `Session` keeps the context, history and file records that feed
//! the next engine run.
pub mod event;
pub mod session;
