pub mod cost_allocator;
pub mod line_classifier;

pub use cost_allocator::CostAllocator;
pub use line_classifier::LineClassifier;
