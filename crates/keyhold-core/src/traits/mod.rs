// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits for the collaborators the session core talks to.
//!
//! All adapters extend the [`StoreAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod durable;
pub mod remote;
pub mod transient;
pub mod volatile;

pub use adapter::StoreAdapter;
pub use durable::DurableStore;
pub use remote::RemoteStore;
pub use transient::TransientStore;
pub use volatile::VolatileStore;
