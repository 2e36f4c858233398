mod localization;

pub use localization::*;
