//! Types shared by the Twinkle client core, the document store and the
//! notification service.

pub mod constants;
pub mod credentials;
pub mod error;
pub mod notify;
pub mod types;

pub use error::{CredentialError, IdError};
pub use types::{ConversationId, MessageId, UserId};
