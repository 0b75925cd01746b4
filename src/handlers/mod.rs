mod accounts;
mod health;

pub use accounts::{login, signup};
pub use health::health_check;
