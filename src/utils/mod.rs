pub mod collection_ext;
pub mod error;
pub mod scheduled_executor;

pub use collection_ext::{group_by, vec_to_map};
pub use error::{ApiError, ApiResult};
pub use scheduled_executor::{ScheduledExecutor, ScheduledTask};
