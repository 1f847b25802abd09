pub mod csv_import;
pub mod error;
pub mod generation;
pub mod llm_config;
pub mod processing_job;
pub mod test_case;
