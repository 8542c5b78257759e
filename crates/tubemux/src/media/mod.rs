pub mod catalog;
pub mod policy;
pub mod stream_descriptor;

pub use catalog::{Locator, Playlist, VideoCatalog};
pub use policy::ResolutionPolicy;
pub use stream_descriptor::{StreamDescriptor, StreamKind};
