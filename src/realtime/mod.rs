mod events;
mod handler;
mod registry;

pub use events::{ClientEvent, ServerEvent};
pub use handler::ws_handler;
pub use registry::SessionRegistry;
