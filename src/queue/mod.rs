pub mod dispatcher;
pub mod events;

pub use dispatcher::{Dispatcher, EnqueueError, SharedQueue};
pub use events::{ProgressBus, ProgressEvent};
