//! Message and MessageHandler of ringkv.
pub mod handlers;
pub mod payload;
pub mod types;

pub use handlers::HandleCrashedMsg;
pub use handlers::HandleMsg;
pub use handlers::MessageHandler;
pub use handlers::MessageHandlerEvent;
pub use handlers::NodeMode;
pub use payload::MessagePayload;
pub use types::*;
