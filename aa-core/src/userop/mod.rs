mod builder;

pub use builder::{DUMMY_SIGNATURE, UserOpBuilder, apply_estimation};
