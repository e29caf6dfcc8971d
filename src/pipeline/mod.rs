//! Plumbing around the core: file input, rendering, encoding, cleanup, and
//! the LLM adapters.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ [coordinator + llm] ──▶ postprocess
//! (path)    (pdfium)   (base64)    (vision service)        (cleanup)
//! ```
//!
//! 1. [`input`]  — validate input files, read page documents, atomic writes
//! 2. [`render`] — rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`] — JPEG-encode and base64-wrap each `DynamicImage`
//! 4. [`llm`]    — `edgequake-llm` adapters for both service traits, plus
//!    provider resolution
//! 5. [`postprocess`] — deterministic cleanup of transcriptions

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
