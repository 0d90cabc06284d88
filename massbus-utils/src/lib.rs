pub mod octprint;
pub mod read_le;
pub mod words;
pub mod write_le;
