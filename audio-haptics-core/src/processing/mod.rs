pub mod capture_ring;
pub mod feature_extractor;
pub mod filters;
pub mod levels;
pub mod sample_convert;
pub mod smoothing;
