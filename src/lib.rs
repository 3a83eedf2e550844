#![warn(clippy::pedantic)]
// Noisy doc/signature lints — would require annotating hundreds of pub functions
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference — keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Intentional casts for duration/timestamp arithmetic throughout the engine and breaker
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
// Module structure — our component modules have foo::Foo pattern by design
#![allow(clippy::module_name_repetitions)]

pub mod aggregator;
pub mod breaker;
pub mod cli;
pub mod config;
pub mod decision_sink;
pub mod errors;
pub mod http;
pub mod mcp;
pub mod registry;
pub mod router;
pub mod schema;
pub mod workflow;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
