pub mod summary;
pub mod work_item;

pub use summary::{JobSummary, LocationType};
pub use work_item::WorkItem;
