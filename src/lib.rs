pub mod controller;
pub mod hardware;
pub mod menu;
pub mod monitor;
pub mod safety;
pub mod scale;
pub mod state;
pub mod storage;
pub mod types;

pub use controller::*;
pub use types::*;
