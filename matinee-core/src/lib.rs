mod backoff;
mod config;
mod playback;
mod reconcile;
mod util;
mod video;

pub use backoff::*;
pub use config::*;
pub use playback::*;
pub use reconcile::*;
pub use util::*;
pub use video::*;
