//! QSOlive field agent
//!
//! Listens for ADIF contact broadcasts from logging software, enriches them
//! with grid-square coordinates, and inserts them into the QSOlive backend.

pub mod adif;
pub mod config;
pub mod contact;
pub mod locator;
pub mod supabase;
pub mod udp;
