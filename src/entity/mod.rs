//! Entity model.

pub mod profile;

pub use profile::{field, FieldKind, FieldDef, Profile, ProfileAttributes, PROFILE_COLUMNS, PROFILE_FIELDS, PROFILE_MODEL, PROFILE_TABLE};
