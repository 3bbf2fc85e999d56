pub mod broadcaster;
pub mod messages;

pub use broadcaster::{ProgressBroadcaster, Subscriber};
pub use messages::{ClientMessage, ProgressMessage};
