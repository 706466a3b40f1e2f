pub mod catalog;
pub mod download;
pub mod library;
pub mod settings;
