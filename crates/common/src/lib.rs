pub mod error;
pub mod identity;
pub mod image;
pub mod usage;

pub use error::{Error, Result};
pub use identity::{Identity, UserProfile};
pub use image::{EnhancementRequest, EnhancementResult, ImageFormat, ScaleFactor};
pub use usage::{UsageRecord, UsageSummary};
