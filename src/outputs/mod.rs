//! Output generation.
//!
//! Results are either printed to stdout or written as a JSON file:
//!
//! ```text
//! output_dir/
//! └── 2025-05-06/
//!     ├── 09-15-02.json
//!     └── 18-40-11.json
//! ```

pub mod json;
