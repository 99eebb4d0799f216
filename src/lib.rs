pub mod bootstrap;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod payment;
pub mod reconciler;
pub mod settlement;
pub mod wallet;

#[cfg(test)]
mod test_support;
