pub mod work_item;
pub mod workflow;
