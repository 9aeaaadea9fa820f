//! Group membership and encrypted fan-out
//!
//! The creator generates one symmetric key per group and hands it to each
//! invitee in a GROUP_INVITE. Messages are sealed once under that key and
//! sent to every other member with a live connection. Membership only grows:
//! invites fix the initial list and GROUP_JOIN notices add to it.

pub mod errors;
pub mod manager;
pub mod membership;

pub use errors::{GroupError, GroupResult};
pub use manager::{GroupBroadcast, GroupManager};
pub use membership::GroupMembership;
