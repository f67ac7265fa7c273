pub mod error;
pub mod event;
pub mod history;
pub mod role;
pub mod tools;
pub mod traits;

pub use error::CoreError;
pub use history::{leading_user_trim, ConversationHistory, HistoryEntry, SourceInfo, DEFAULT_MAX_HISTORY};
pub use role::{ClassificationStats, Role, RoleClassifier, DEFAULT_ROLE};
pub use tools::ToolRegistry;
pub use traits::{Tool, ToolOutput, ToolSpec};
