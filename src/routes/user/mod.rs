pub mod handler;
pub mod model;

pub use handler::{check_email, find_by_id, login, register, update_profile};
