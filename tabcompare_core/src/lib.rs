pub mod events;
pub mod full_row;
pub mod key_resolver;
pub mod loader;
pub mod membership;
pub mod normalize;
pub mod orchestrator;
pub mod set_algebra;

pub use events::{ProgressEvent, ProgressRx, ProgressTx};
pub use full_row::FullRowComparator;
pub use key_resolver::{common_columns, KeyPlan, KeyResolver, KeySelection, KeyedDataset};
pub use loader::{
    discover_files, is_csv_file, is_excel_file, sheet_names, DatasetLoader, FileLoader, SourceSpec,
};
pub use membership::{Aggregation, DatasetCounts, MembershipAggregator};
pub use normalize::{NormalizeOptions, NumericPolicy, ValueNormalizer};
pub use orchestrator::{CompareOptions, ComparisonOrchestrator};
pub use set_algebra::{SetAlgebraEngine, SetAlgebraOutcome};
