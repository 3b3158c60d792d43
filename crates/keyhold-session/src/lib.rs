// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session core for the Keyhold vault client.
//!
//! Owns the unwrapped data key and the encrypted item cache, drives the
//! `NoSession` / `Locked` / `Unlocked` lifecycle with idle auto-lock, and
//! implements the credential handoff between the page context and the
//! privileged session. Every transition is broadcast to observers.

pub mod broadcast;
pub mod cache;
pub mod domain;
pub mod handoff;
pub mod idle;
pub mod machine;
pub mod transient;

pub use broadcast::{ObserverId, StateBroadcaster};
pub use cache::ItemCache;
pub use domain::normalize_domain;
pub use handoff::{
    Candidate, DiscardReason, HandoffOutcome, HandoffProtocol, PageContext, SavePrompt,
};
pub use machine::SessionMachine;
pub use transient::MemoryTransientStore;
