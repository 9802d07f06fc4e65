pub mod envelope;
pub mod token;
pub mod user;

pub use envelope::{normalize, ApiResult, Envelope};
pub use token::{Credentials, TokenGrant};
pub use user::UserProfile;
