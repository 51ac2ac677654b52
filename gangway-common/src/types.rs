mod listen_endpoint;
mod secret;

use uuid::Uuid;

pub use listen_endpoint::ListenEndpoint;
pub use secret::Secret;

pub type SessionId = Uuid;
