// Domain layer - Archive data model and pure rules
pub mod binning;
pub mod error;
pub mod operator;
pub mod series;
pub mod time_range;
