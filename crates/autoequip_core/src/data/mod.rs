//! Data structures for weapon definitions.
//!
//! Pure data types deserialized from RON. This module does no file IO;
//! callers read the text and hand it to the parsers here.

mod weapon_data;

pub use weapon_data::{WeaponDef, WeaponDefRegistry};
