// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event, filter and kind model (spec §3, §4.1)

pub mod filter;
pub mod id;
pub mod kind;
pub mod model;
pub mod pubkey;
pub mod sig;
pub mod tag;

pub use filter::{match_filter, match_filters, Filter};
pub use id::EventId;
pub use kind::{Kind, KindClass};
pub use model::{reason, validate_auth_event, validate_created_at, validate_event, Address, Event};
pub use pubkey::PublicKey;
pub use sig::Signature;
pub use tag::Tag;
