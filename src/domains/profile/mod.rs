pub mod types;
pub mod repository;

pub use types::{Credentials, Identity, NewAccount, ProfilePatch, ProfileRow, ProfileUpdate};
pub use repository::ProfileRepository;
