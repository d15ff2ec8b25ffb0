//! # RH Core
//!
//! Core logic for the respondent home access code gateway.
//!
//! This crate turns a submitted access code into a signed eQ launch:
//! - Access code parsing and validation
//! - Registry lookups (access codes, cases, collection instruments and exercises, samples)
//! - eQ claim set construction
//! - The redemption stages and the translation of failures into user-facing outcomes
//!
//! **No API concerns**: HTTP serving and page rendering belong in `api-rest`.

pub mod access_code;
pub mod config;
pub mod constants;
pub mod eq;
pub mod error;
pub mod models;
pub mod redemption;
pub mod registry;
pub mod translate;

pub use access_code::{AccessCode, AccessCodeForm};
pub use config::{AppConfig, ConfigError, Service};
pub use eq::EqClaimSet;
pub use error::{RedemptionError, RedemptionResult, Rejection, SystemFailure};
pub use redemption::{Aborted, Redeemer, Redirect, RedemptionStage};
pub use registry::RegistryClient;
pub use translate::{Page, Translation, UserMessage, translate};
