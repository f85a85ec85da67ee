//! Cross-module tests: lifecycle properties and end-to-end scenarios.

mod ranking;
mod support;
