//! actcheck: validation service for scanned Russian service acts.
//!
//! A document image goes through perspective correction, hybrid OCR
//! (classical Tesseract runs arbitrated against a vision-model fallback),
//! text cleanup, regex field extraction and a rule-based validation pass,
//! producing a persisted [`pipeline::DocumentRecord`] with an APPROVED,
//! NEEDS_REVIEW or REJECTED verdict.

pub mod api;
pub mod config;
pub mod ollama;
pub mod pipeline;
pub mod store;
