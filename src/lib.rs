//! Reconcile candidate article selections against the authoritative store
//! and stage them as a JSON checkpoint for the downstream attacher.
//!
//! Stages communicate only through files on disk:
//! selector → [`reconcile`] → [`stage`] → attacher (spawned by [`runner`]).
//! [`status`] lets an admin UI follow progress; [`api`] exposes all of it
//! over HTTP.

pub mod api;
pub mod config;
pub mod content_api;
pub mod db;
pub mod lookup;
pub mod model;
pub mod pipeline;
pub mod reconcile;
pub mod runner;
pub mod stage;
pub mod status;
