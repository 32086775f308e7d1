// Public modules
pub mod chat_request;
pub mod finish;
pub mod message;
pub mod session_status;
pub mod stream_event;
pub mod stream_part;
pub mod stream_protocol;

// Re-exports
pub use chat_request::{ChatRequest, ClientMessage};
pub use finish::{Finish, FinishReason, Usage};
pub use message::{Message, MessageId, MessageRole, MessageStatus};
pub use session_status::SessionStatus;
pub use stream_event::StreamEvent;
pub use stream_part::StreamPart;
pub use stream_protocol::StreamProtocol;
