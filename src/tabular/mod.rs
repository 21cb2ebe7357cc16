//! CSV handling: reading, type inference, cell coercion and writing.

pub mod coerce;
pub mod infer;
pub mod reader;
pub mod writer;

pub use coerce::{CoercedRows, ColumnBinding, coerce_cell, coerce_rows, default_value};
pub use infer::{infer_columns, infer_type};
pub use reader::{TabularData, TabularOptions, read_tabular, read_tabular_file};
pub use writer::{render_cell, write_csv};
