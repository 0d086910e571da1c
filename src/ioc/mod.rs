// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Process variables and the RGA IOC that drives them
//!
//! [`PvDatabase`] holds the named values, [`RgaIoc`] reacts to puts on the
//! control PVs and keeps the channel PVs fed from an [`RgaSource`].

pub mod pv;
pub mod rga;
pub mod source;

pub use pv::{ProcessVariable, PutEvent, PvDatabase, PvError, PvKind, PvValue};
pub use rga::{RgaIoc, RgaPvNames};
pub use source::{shared, RgaSource, SharedSource};
