mod host;
mod viewer;
mod watcher;

pub use host::*;
pub use viewer::*;
pub use watcher::*;
