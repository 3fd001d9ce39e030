pub mod permission;
pub mod profile;

pub use profile::{Identity, ProfileRepository};
