//! Application wiring.

mod context;
mod error;
mod state;

pub use context::AuthContext;
pub use error::{CommandError, CommandResult};
pub use state::AppState;
