//! # relate-rs-model
//!
//! Read-only entity-graph metadata consumed by the relate-rs query compiler.
//! A [`Model`](metadata::Model) holds [`EntityType`](metadata::EntityType)s
//! with properties, primary keys, foreign keys, and navigation properties
//! (Reference or Collection, with inverses). Models are built and validated
//! once through [`ModelBuilder`](builder::ModelBuilder), then shared
//! immutably across compilations.
//!
//! ## Module Overview
//!
//! - [`metadata`] - Entity, property, foreign-key, and navigation metadata
//! - [`builder`] - Validating [`ModelBuilder`](builder::ModelBuilder)
//! - [`value`] - The backend-agnostic [`Value`](value::Value) enum

pub mod builder;
pub mod metadata;
pub mod value;

pub use builder::ModelBuilder;
pub use metadata::{
    EntityId, EntityType, ForeignKey, ForeignKeyRef, Model, Multiplicity, NavigationKind,
    NavigationProperty, NavigationRef, Optionality, Property, PropertyRef,
};
pub use value::{Value, ValueType};
