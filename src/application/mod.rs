pub mod use_cases;

pub use use_cases::csv_import::CsvImportUseCase;
pub use use_cases::generation_pipeline::{GenerationInput, GenerationPipeline};
pub use use_cases::job_tracker::JobTracker;
pub use use_cases::reconciler::ReconcileUseCase;
pub use use_cases::test_generation::GenerationOrchestrator;
