//! Output writers run by the file sink

pub mod save_stream;

pub use save_stream::SaveStream;
