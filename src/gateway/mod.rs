//! Gateway server implementation

pub mod auth;
mod router;
mod server;

pub use auth::{Authenticator, Principal, Rejection, auth_middleware};
pub use router::{AppState, create_router};
pub use server::Gateway;
