pub mod apps;
pub mod check;
pub mod config;
pub mod daemon;
pub mod recover;
pub mod study;
pub mod timer;
