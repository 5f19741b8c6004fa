// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

pub mod decryptor;
pub mod kao_factory;
pub mod kao_selector;
pub mod label_validator;
