pub mod advisory;
pub mod cluster;
pub mod db;
pub mod error;
pub mod features;
pub mod inactivity;
pub mod memory;
pub mod models;
pub mod performance;
pub mod recommend;
pub mod report;
pub mod sentiment;
pub mod store;
pub mod trend;

pub use cluster::{cluster_students, ClusterOptions};
pub use error::{AnalyticsError, Result};
pub use features::extract_features;
pub use inactivity::{detect_inactivity, InactivityOptions};
pub use memory::MemoryStore;
pub use performance::{class_performance, identify_at_risk, student_grade_buckets};
pub use recommend::recommend_content;
pub use sentiment::analyze_sentiment;
pub use store::RecordStore;
pub use trend::predict_performance;
