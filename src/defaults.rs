// src/defaults.rs

// Search limits
//
// MAX_EDIT_DISTANCE is the hard ceiling of the edit-distance engine; the
// configured max distance plus the extra search depth must stay below it.
pub const MAX_EDIT_DISTANCE: u32 = 31;

pub const MAX_HITS: u32 = 300;
pub const MAX_DIST: u32 = 14;
pub const EXTRA_SEARCH_DEPTH: u32 = 2;
pub const NUM_SEEDS: u32 = 4;
pub const SEED_COVERAGE: f64 = 0.0;
pub const MIN_WEIGHT_TO_CHECK: u32 = 1;

// Secondary alignments
pub const MAX_SECONDARY_EDIT_DISTANCE: i32 = -1; // disabled
pub const MAX_SECONDARY_ALIGNMENTS: u32 = u32::MAX;

// Input handling
pub const MIN_READ_LENGTH: u32 = 50;
pub const DEFAULT_READ_GROUP: &str = "FASTQ";

// Reporting
pub const VERBOSITY: u8 = 3;
