//! Pipeline stages for rebuilding a `xochitl` folder as a PDF tree.
//!
//! Each submodule implements one step. Stages only talk to each other
//! through plain data ([`crate::tree::Tree`], [`compat::PagePlan`],
//! [`pdf::DocumentPlan`]) so every one of them can be tested on its own,
//! and the two external tools sit behind traits.
//!
//! ## Data Flow
//!
//! ```text
//! schema ──▶ index ──▶ compat ──▶ render ──▶ background ──▶ pdf ──▶ assemble
//! (sidecars)  (Tree)   (verdict)   (rmc)     (templates)  (pdfium)  (write)
//! ```
//!
//! 1. [`schema`]     — typed `.metadata` / `.content` / `.pagedata` parsing
//! 2. [`index`]      — scan the folder into a [`crate::tree::Tree`]
//! 3. [`compat`]     — per-document verdict and per-page plan
//! 4. [`render`]     — `.rm` → SVG through the external renderer; runs in
//!    `spawn_blocking`
//! 5. [`background`] — template / document-PDF backgrounds and overlay geometry
//! 6. [`pdf`]        — compose the final PDF (pdfium, behind [`pdf::PdfBackend`])
//! 7. [`assemble`]   — drive one document through its state machine and
//!    write the output atomically

pub mod assemble;
pub mod background;
pub mod compat;
pub mod index;
pub mod pdf;
pub mod render;
pub mod schema;
