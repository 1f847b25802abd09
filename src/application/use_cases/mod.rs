pub mod chunking;
pub mod csv_import;
pub mod embedding_service;
pub mod generation_pipeline;
pub mod job_tracker;
pub mod reconciler;
pub mod retrieval_service;
pub mod test_generation;
