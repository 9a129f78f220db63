//! Pure, deterministic session logic (no I/O).

pub mod action;
pub mod history;
pub mod observation;
pub mod types;
