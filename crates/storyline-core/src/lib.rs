//! Scenario runtime for interactive puzzle devices.
//!
//! The crate is split leaf to root: the scenario model and validator, the
//! bounded event queue, the transition engine, the checksum-verified resource
//! store, the controller that wraps the engine with storm suppression and
//! metrics, and the portable runtime that decides where scenarios come from.
//! Peripherals (audio, screen, detectors) sit behind the [`app_host::AppHost`]
//! trait and the filesystem behind [`resources::ResourceFs`].

pub mod app_host;
pub mod catalog;
pub mod command;
pub mod controller;
pub mod engine;
pub mod event;
pub mod registry;
pub mod resources;
pub mod runtime;
pub mod scenario;
