#![doc = include_str!("../README.md")]

pub mod backends;
pub mod interpolate;
pub mod solver;
pub mod terms;
