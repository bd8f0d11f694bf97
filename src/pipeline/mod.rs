//! Pipeline stages for OCR markdown post-processing.
//!
//! Each submodule implements exactly one transformation step. Keeping
//! stages separate makes each independently testable and lets the
//! deterministic stages run without any LLM configured.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ images ──▶ tables ──▶ refine ──▶ postprocess
//! (path/URL) (store+rewrite) (rebuild) (LLM, optional) (reply cleanup)
//! ```
//!
//! 1. [`input`]: load the OCR JSON from a local path or URL
//! 2. [`payload`]: normalise and validate base64 image payloads, sniff MIME
//! 3. [`images`]: persist page images and rewrite their markdown tags;
//!    synchronous, run under `spawn_blocking` by the orchestrator
//! 4. [`tables`]: rebuild malformed pipe tables; pure and idempotent
//! 5. [`refine`]: best-effort LLM pass with mandatory fallback
//! 6. [`llm`]: provider resolution and chat calls with retry/backoff;
//!    the only stage with network I/O besides `input`
//! 7. [`postprocess`]: deterministic cleanup of model replies (fences,
//!    line endings, invisible characters)

pub mod images;
pub mod input;
pub mod llm;
pub mod payload;
pub mod postprocess;
pub mod refine;
pub mod tables;
