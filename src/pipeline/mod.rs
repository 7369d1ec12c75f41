//! Pipeline stages for one OCR batch.
//!
//! Each submodule implements exactly one step of the request lifecycle and
//! talks to the service only through [`crate::transport::OcrTransport`], so
//! every stage is testable with an in-process transport.
//!
//! ## Data Flow
//!
//! ```text
//! scan ──▶ submit ──▶ upload ──▶ poll ──▶ download
//! (dir)    (keys)     (files)    (state)  (txt + alto)
//!                       │
//!                   transcode
//!                  (TIFF → JPEG)
//! ```
//!
//! 1. [`scan`]      discover images and derive their keys; local only
//! 2. [`submit`]    create the remote request announcing every key
//! 3. [`upload`]    send each file, transcoding TIFF through [`transcode`]
//! 4. [`poll`]      wait until every uploaded key is terminal
//! 5. [`download`]  write `<stem>.txt` / `<stem>.xml` beside each source
//!
//! Stages 2 and 4 fail the whole run on error; stages 3 and 5 record
//! per-file failures and keep going.

pub mod download;
pub mod poll;
pub mod scan;
pub mod submit;
pub mod transcode;
pub mod upload;
