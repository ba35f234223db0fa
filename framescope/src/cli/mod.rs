//! Command-line interface of the `framescope` viewer binary

pub mod args;

pub use args::{Args, Command, DemoArgs, InputArgs, UsageError};
