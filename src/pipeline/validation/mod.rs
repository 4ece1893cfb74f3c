//! Per-court identifier validation.
//!
//! One generic engine parameterized by a [`CourtProfile`]; courts differ only
//! in their rule, never in code.
//!
//! [`CourtProfile`]: crate::models::CourtProfile

pub mod engine;
pub mod export;
pub mod tokenize;

pub use engine::*;
pub use export::*;
pub use tokenize::*;
