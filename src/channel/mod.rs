//! Channel state and the registry that owns it.

mod queue;
pub use queue::ChannelQueue;

mod registry;
pub use registry::{ChannelRegistry, Registration};

mod state;
pub use state::ChannelSnapshot;
