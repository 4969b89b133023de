//! Desktop use-case logic: the login state machine, the channel-driven flow,
//! and the post-login re-verification loop.

pub mod flow;
pub mod reverify;
pub mod state;
