//! Protocol Tests
//!
//! Wire codec, typed builders and the dispatcher, exercised through the
//! public `keyward::protocol` API.

mod builder_tests;
mod dispatch_tests;
mod scenario_tests;
