// =============================================================================
// LINEAR MODULE
// =============================================================================
//
// Issue tracking through Linear's GraphQL API. The tools accept names where
// Linear wants IDs; `name_resolution` holds the matching rules and does no
// I/O, so it is tested on its own.

pub mod linear_client;
pub mod linear_tools;
pub mod name_resolution;

pub use linear_client::{LinearClient, LinearError};
pub use linear_tools::register_linear_tools;
