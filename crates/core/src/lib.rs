pub mod backend;
pub mod controller;
pub mod history;
pub mod message;
pub mod session;
pub mod state;
pub mod timeline;

pub use backend::{ChatBackend, Clipboard, Confirm};
pub use controller::{DeleteOutcome, FormError, QuickAction, SyncController};
pub use history::HistoryIndex;
pub use message::{Classification, ImageRef, Message};
pub use session::SessionStore;
pub use state::{ChatEvent, ChatState, Notice, NoticeLevel, Operation, Phase, Rejection, Transition};
pub use timeline::Timeline;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
