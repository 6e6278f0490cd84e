//! GPT Buddy Library
//!
//! Core modules for the GPT Buddy voice assistant.

pub mod adapter;
pub mod assistant;
pub mod commands;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod error;
pub mod gallery;
pub mod imaging;
pub mod jobs;
pub mod notify;
pub mod presenter;
pub mod session;
pub mod tasks;
pub mod tts;
