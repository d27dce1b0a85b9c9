// The infra module contains implementations of core traits and the clients
// behind the assistant's tools. Each integration goes in its own submodule.

#[path = "ai/mod.rs"]
pub mod ai;

#[path = "conversation/mod.rs"]
pub mod conversation;

#[path = "google/mod.rs"]
pub mod google;

#[path = "linear/mod.rs"]
pub mod linear;
