//! Persistent records. Allocations and progress criteria live inside the project
//! document as JSON columns so a project is read and written as one unit.

pub mod alert;
pub mod budget;
pub mod material;
pub mod project;
pub mod stock_movement;
pub mod user;
pub mod warehouse;
