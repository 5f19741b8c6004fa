// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

pub mod classification;
pub mod coi;
pub mod country;
pub mod decryption;
pub mod kao;
pub mod label;
