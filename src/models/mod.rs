//! Data models for the circulation desk

pub mod book;
pub mod patron;

// Re-export commonly used types
pub use book::{Book, BookPage, CreateBook, UpdateBook};
pub use patron::{BorrowRecord, Patron, PatronClaims, PatronProfile};
