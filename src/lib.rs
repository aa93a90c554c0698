//! lrcsync - word-level lyric timing
//!
//! Aligns reference lyrics (LRC or plain text) against speech recognition
//! output with word timestamps and renders enhanced LRC with a time tag
//! before every character or word.

pub mod align;
pub mod cli;
pub mod config;
pub mod error;
pub mod lyric;
pub mod recognition;
pub mod timecode;
pub mod worker;
pub mod workflow;
