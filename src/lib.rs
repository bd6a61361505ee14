//! genpipe: lifecycle coordination for streaming generation tasks.
//!
//! A [`pipeline::GenerateTaskPipeline`] sits between the application runner
//! and the client stream. It normalises queued failures into
//! [`errors::TaskError`]s and runs output moderation once per task. It also
//! builds the stream responses sent to the client.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod entities;
pub mod errors;
pub mod logging;

pub mod moderation;
pub mod queue;
pub mod store;

pub mod pipeline;
