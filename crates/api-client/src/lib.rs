pub mod client;
pub mod error;
pub mod reply;
pub mod upload;

pub use client::ApiClient;
pub use error::{ApiError, Result};
pub use reply::AssistantReply;
pub use tvision_api;
pub use upload::ImageUpload;
