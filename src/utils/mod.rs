pub mod anonymize;
pub mod error;
pub mod scheduled_executor;
pub mod string_ext;

pub use anonymize::anonymize_query_text;
pub use error::{CollectorError, CollectorResult, StageError, StageErrorKind, StageResult};
pub use scheduled_executor::{ScheduledExecutor, ScheduledTask};
pub use string_ext::{StringExt, joined_ids, quoted_list};
