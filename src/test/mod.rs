mod db;
mod sessions;
pub mod utils;

pub use utils::{test_db, test_utils};
