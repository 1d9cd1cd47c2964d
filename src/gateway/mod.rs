//! HTTP gateway: routes, request validation, sign-in normalization and the
//! server runtime

pub mod dto;
pub mod normalize;
pub mod router;
pub mod server;

pub use normalize::{AssertionExchanger, signin_response};
pub use router::{AppState, create_router};
pub use server::Server;
