// Test modules

mod capability_service_test;
pub mod common;
mod execution_plan_service_test;
mod pipeline_test;
mod publisher_test;
mod wait_event_service_test;
