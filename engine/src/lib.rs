//! Deskpilot Engine Library
//!
//! This library provides the core functionality of the Deskpilot engine.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Task state machine and message history
pub mod task;

/// Message bus for task lifecycle notifications
pub mod message_bus;

/// Conversation adapter and model providers
pub mod llm;

/// Action dispatcher and desktop input drivers
pub mod desktop;

/// Computer tool surface
pub mod tools;

/// Agent control loop
pub mod agent;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
