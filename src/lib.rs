//! tezgate: connection and transaction approval gateway between Tezos dApps
//! and a human key holder.
//!
//! Requesting applications ask for permission, operations, signatures and
//! broadcasts. Anything that spends or signs goes through an approval
//! surface the user answers over the intercom protocol.

pub mod arbiter;
pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod confirm;
pub mod error;
pub mod gateway;
pub mod intercom;
pub mod micheline;
pub mod network;
pub mod preview;
pub mod session;
pub mod settings;
pub mod storage;
pub mod validate;
