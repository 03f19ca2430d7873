pub mod fixtures;

#[cfg(test)]
mod health_tests;
#[cfg(test)]
mod intake_tests;
#[cfg(test)]
mod pipeline_tests;
