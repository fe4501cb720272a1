mod controller;
mod listener;
mod observer;

pub use controller::*;
pub use listener::*;
pub use observer::*;
