pub mod ai;
pub mod app;
pub mod auth;
pub mod daemon;
pub mod process;
pub mod queue;
pub mod screenshot;
pub mod shortcuts;
pub mod system;
pub mod window;
