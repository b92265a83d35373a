pub mod adventures;
pub mod auth;
pub mod billing;
pub mod error;
pub mod extract;
pub mod messages;
pub mod middleware;
pub mod preseeded;
pub mod profile;
pub mod quota;
pub mod relay;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{AppState, AppStateInner};
