//! Test suites for the management agent.

mod support;
