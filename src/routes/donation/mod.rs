pub mod handler;
pub mod model;

pub use handler::{
    accept_donation,
    create_donation,
    find_available,
    find_by_donor,
    find_by_id,
    find_by_ngo,
    update_status,
};
