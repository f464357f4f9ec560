pub mod cli;
pub mod config;
pub mod transformer;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;
