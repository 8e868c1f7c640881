//! Small, self-contained helpers that don't belong to any one subsystem.
//!
//! Mirrors the teacher's `utils` layout, trimmed to what the rest of the
//! crate actually reaches for: lineage/run id generation.

pub mod id_generator;
