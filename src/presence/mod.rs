mod broadcaster;
mod registry;

pub use broadcaster::Presence;
pub use registry::{Connection, Outgoing, SessionRegistry, Sessions};
