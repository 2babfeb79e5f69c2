pub mod cascade;
pub mod column_solver;
pub mod format_extractor;
pub mod integration;
pub mod line_validator;
pub mod mapping_cache;

pub use cascade::{validate_cascade, TaxBase, TaxSettings};
pub use column_solver::{
    apply_mapping, parse_csv_rows, solve_columns, solve_columns_consensus, validate_mapped_rows,
    validate_rows_with_mapping, SolverSettings,
};
pub use format_extractor::{best_format, extract_all_formats, extract_kind};
pub use integration::MathValidator;
pub use line_validator::{derive_value, find_valid_formula, validate_line, validate_mapped_line};
pub use mapping_cache::{CachedMapping, MappingCache};
