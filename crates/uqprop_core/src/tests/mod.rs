//! Integration tests for the uqprop engine
//!
//! Tests are organized by topic:
//! - `data` - Data and DataFeature containers and the JSON store
//! - `quantify` - End-to-end quantification with both methods
//! - `exploration` - Distribution sweeps and Monte Carlo comparison

mod quantify;
