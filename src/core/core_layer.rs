// The core module contains all business logic.
// Each feature gets its own submodule. Nothing in here knows about WhatsApp,
// Google or Linear; those live behind the traits defined in `ai`.

#[path = "ai/mod.rs"]
pub mod ai;
