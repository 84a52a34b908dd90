pub mod handler;
pub mod model;

pub use handler::{create_message, mark_read};
