//! Tauri command handlers
//!
//! This module contains the IPC command handlers the frontend calls through
//! Tauri's invoke system.

pub mod panel;
