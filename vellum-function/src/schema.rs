//! Wire types exchanged between the composition engine and a function.
//!
//! The JSON shape follows the protobuf JSON mapping of the function protocol:
//! camelCase field names, enums as SCREAMING_SNAKE_CASE strings, and
//! durations as decimal seconds with an `s` suffix.

pub mod v1;
