//! Active-record style persistence for documents in a document store.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Field paths** ([`path`]) - Dotted path parsing, validation and nested writes
//! - **Change tracking** ([`diff`]) - The minimal set of pending field changes
//! - **Entities** ([`entity`]) - Property trees with persistence state
//! - **Models** ([`model`]) - Save, delete, restore and finder operations
//! - **Retries** ([`retry`]) - Bounded retry of single-document writes
//! - **Bulk writes** ([`bulk`]) - Batch write descriptors built from entities
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Query and filtering API** ([`query`]) - Backend-neutral filter expressions
//! - **Configuration** ([`config`]) - Per-model settings
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! let jedi = store.model_for(ModelConfig::builder("jedi").build()?);
//!
//! let mut vader = jedi.create();
//! vader.set("name", "Anakin Skywalker")?;
//! jedi.save(&mut vader).await?;
//!
//! vader.set("name", "Darth Vader")?;
//! jedi.save(&mut vader).await?; // $set { name, updated_at }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_core;

pub mod backend;
pub mod bulk;
pub mod config;
pub mod datetime;
pub mod diff;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod model;
pub mod observer;
pub mod path;
pub mod query;
pub mod retry;
pub mod store;
