// World EV Data - Core Library
// Exposes all modules for use in the CLI and tests

pub mod errors;
pub mod coerce;
pub mod power_type;     // Powertrain vocabulary (versioned)
pub mod period;
pub mod schema;         // Canonical long-format schema
pub mod grid;           // Spreadsheet cells
pub mod locale;         // Scoped formatting locale
pub mod locator;        // Base-row detection for shifting layouts
pub mod validate;       // Marker checks per file
pub mod extractors;     // One extractor per publisher
pub mod merge;
pub mod cache;
pub mod quality;
pub mod config;
pub mod pipeline;

// Re-export commonly used types
pub use errors::{Error, Result};
pub use coerce::{float_or, int_or, percent_to_fraction, Scalar};
pub use power_type::{coarsen_counts, PowerType, Revision};
pub use period::Granularity;
pub use schema::{
    EntityTags, EntityType, Fragment, Metric, Record, ValidationError, ValidationResult,
};
pub use grid::{Cell, Col, Grid};
pub use locale::LocaleScope;
pub use locator::{locate_base_row, Probe};
pub use validate::{MarkerCheck, StructuralValidator};
pub use extractors::{
    detect_source, get_extractor, SourceExtractor, SourceType, ZevPolicy,
    KbaAggregator, KbaExtractor, KbaTable, VehicleClass,
    RobbieAndrewExtractor, IeaExtractor, OwidExtractor, ExtraExtractor,
};
pub use merge::{Conflict, MergeEngine, MergePolicy, MergeReport};
pub use cache::{CacheStatus, FragmentCache};
pub use quality::{BatchSummary, QualityEngine, QualityIssue, QualityReport, Severity};
pub use config::Config;
pub use pipeline::{merge_all_ev_data, Pipeline, SourceChecks};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
