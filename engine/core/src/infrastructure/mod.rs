// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

pub mod circuit_breaker;
pub mod kas_client;
pub mod wrapping;
