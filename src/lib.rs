pub mod app;
pub mod broker;
pub mod cli;
pub mod constants;
pub mod content;
pub mod error;
pub mod frontend;
pub mod identity;
pub mod logging;
pub mod session;

#[cfg(test)]
pub(crate) use logging::setup_test_logging;

#[cfg(test)]
mod tests;
