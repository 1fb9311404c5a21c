pub mod data_url;
pub mod file_size;
