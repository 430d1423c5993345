//! Menu item model and tree container.
//!
//! This crate holds the domain model shared between a device and a remote
//! application: the menu items themselves and the [`MenuTree`] container that
//! keeps them organised under submenus together with their current values.
//!
//! The tree is owned by the application; the remote engine only appends and
//! updates entries as bootstrap and value-change messages arrive. Items are
//! immutable value objects - an update replaces the whole item rather than
//! mutating it in place.

mod items;
mod tree;

pub use items::*;
pub use tree::*;
