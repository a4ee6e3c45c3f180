pub mod alerts;
pub mod budgets;
pub mod catalog;
pub mod common;
pub mod health;
pub mod projects;
pub mod users;

pub use crate::AppState;
