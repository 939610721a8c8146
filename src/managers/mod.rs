pub mod dump;
pub mod hooks;
pub mod logging;
pub mod prune;
pub mod restore;
pub mod retention;
pub mod timer;
