//! goldcheck core library
//!
//! Everything that does not spawn a process: model discovery, draw-table
//! summaries, gold records, tolerance checks and report building.

pub mod config;
pub mod error;
pub mod gold;
pub mod judge;
pub mod locator;
pub mod report;
pub mod similarity;
pub mod summary;
pub mod telemetry;
pub mod timings;

pub use config::{BuildConfig, HarnessConfig, LocatorConfig, RunConfig, MAX_PARALLELISM};
pub use error::{DrawTableError, HarnessError, Result};
pub use gold::GoldStore;
pub use judge::{judge, ComparisonMode, Mismatch, TolerancePolicy, Verdict};
pub use locator::{DiscoveredModel, Model, ModelLocator};
pub use report::{render_junit, write_json, write_junit, CaseReport, RunOutcome, SuiteReport};
pub use similarity::{LcsRatio, SimilarityStrategy};
pub use summary::{summarize_file, summarize_reader, ParamStats, Summary};
pub use telemetry::init_tracing;
pub use timings::{compare_timings, read_timings_csv, write_timings_csv, TimingComparison};

/// goldcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
