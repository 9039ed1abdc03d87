mod conversation;
mod registry;

pub use conversation::ConversationLog;
pub use registry::CardRegistry;
