pub mod csv_reader;
pub mod csv_writer;

pub use csv_reader::{read_csv, CsvReadOptions, CsvReader};
pub use csv_writer::{write_csv, CsvWriteOptions};
