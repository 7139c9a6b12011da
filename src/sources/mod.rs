//! Input sources for the loader.

mod local;

pub use local::LocalDirectory;
