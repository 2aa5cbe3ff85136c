pub use evalcsv_types::*;
