//! # phonebot-domain
//!
//! Pure domain model for the phonebot automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error taxonomy, timestamps
//! - Define the closed **property type system** (types, subtypes, descriptors, values)
//! - Validate and normalise raw values through the [`registry::TypeRegistry`]
//! - Map property types to **presentation** hints (widgets, selector screens)
//! - Define **Events** (things that happened and may trigger rules)
//! - Define **Rules** (trigger expression → ordered actions) in raw and compiled form
//! - Describe the **catalog** of known action and event shapes
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod catalog;
pub mod event;
pub mod presentation;
pub mod property;
pub mod registry;
pub mod rule;
