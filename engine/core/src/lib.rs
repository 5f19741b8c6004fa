// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

//! Zero-Trust Data Format (ZTDF) policy-enforcement engine.
//!
//! The two halves of the engine:
//!
//! - **Encryption path**: [`application::label_validator::SecurityLabelValidator`]
//!   checks a proposed security label for coherence, then
//!   [`application::kao_factory::KaoFactory`] seals the payload and emits the
//!   policy-bound Key Access Objects.
//! - **Decryption path**: [`application::kao_selector::KaoSelector`] filters
//!   and orders a resource's KAOs for the requester, then
//!   [`application::decryptor::MultiKasDecryptor`] walks the ordered list,
//!   consulting the per-KAS
//!   [`infrastructure::circuit_breaker::CircuitBreakerRegistry`], and performs
//!   the final authenticated decryption.
//!
//! Transport, persistence and federation trust bootstrap live outside this
//! crate; the engine consumes them through the traits in
//! [`domain::coi`] and [`infrastructure::kas_client`].

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::decryptor::{DecryptorConfig, MultiKasDecryptor};
pub use application::kao_factory::{KaoFactory, SealError, ZtdfEnvelope};
pub use application::kao_selector::{KaoSelector, ScoredKao, Selection, SelectionBasis};
pub use application::label_validator::{
    LabelViolation, PolicyViolation, SecurityLabelValidator, ValidationResult, ValidatorConfig,
};
pub use domain::classification::Classification;
pub use domain::coi::{
    BuiltinCoiTable, CoiMembership, CoiMembershipProvider, CoiRelationshipGraph,
    FailSafeMembership,
};
pub use domain::country::CountryCode;
pub use domain::decryption::{
    AttemptOutcome, AttemptRecord, DecryptFailure, DecryptionRequest, DecryptionResult,
    RequesterAttributes,
};
pub use domain::kao::{KasEndpoint, KasRegistry, KasService, KeyAccessObject, PolicyBinding};
pub use domain::label::{Caveat, CoiOperator, SecurityLabel};
pub use infrastructure::circuit_breaker::{
    BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreakerRegistry,
};
pub use infrastructure::kas_client::{HttpKeyReleaseClient, KasClientError, KeyReleaseClient};
pub use infrastructure::wrapping::{AesGcmKeyWrapper, ContentKeyWrapper};
